//! Fact store repository trait.
//!
//! Canonical facts are written in period-scoped batches and read back in pages
//! by the calculation engine. The coverage index derived from them is persisted
//! alongside.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::{
    CanonicalFact, CoverageEntry, DateRange, FactQuery, FactReplaceOutcome, MonthDayCount,
    SourceSystem,
};

/// Repository trait for the canonical fact store.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait FactRepository: Send + Sync {
    /// Check if the storage backend is reachable.
    async fn health_check(&self) -> RepositoryResult<bool>;

    /// Replace facts for one source system in a single atomic step.
    ///
    /// When `overwrite` is `Some(range)`, every fact of `source` dated inside the
    /// range is deleted before `facts` are appended. Delete and insert commit
    /// together.
    ///
    /// # Returns
    /// * `Ok(FactReplaceOutcome)` - Number of rows deleted and inserted
    async fn replace_facts(
        &self,
        source: SourceSystem,
        overwrite: Option<DateRange>,
        facts: &[CanonicalFact],
    ) -> RepositoryResult<FactReplaceOutcome>;

    /// Read one page of facts matching `query`, in a stable order.
    ///
    /// # Arguments
    /// * `query` - Date range and optional filters
    /// * `offset` - Number of matching rows to skip
    /// * `limit` - Maximum number of rows to return
    async fn fetch_facts_page(
        &self,
        query: &FactQuery,
        offset: usize,
        limit: usize,
    ) -> RepositoryResult<Vec<CanonicalFact>>;

    /// Count distinct report dates inside `range`.
    async fn count_distinct_dates(&self, range: DateRange) -> RepositoryResult<usize>;

    /// Distinct report-date counts grouped by (year, month) over the whole store.
    async fn distinct_days_by_month(&self) -> RepositoryResult<Vec<MonthDayCount>>;

    /// Total number of stored facts.
    async fn count_facts(&self) -> RepositoryResult<usize>;

    /// Truncate the coverage index and repopulate it with `entries`.
    async fn replace_coverage(&self, entries: &[CoverageEntry]) -> RepositoryResult<()>;

    /// List the persisted coverage index, ordered by (year, month).
    async fn list_coverage(&self) -> RepositoryResult<Vec<CoverageEntry>>;
}
