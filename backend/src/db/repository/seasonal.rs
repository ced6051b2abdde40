//! Seasonal coefficient repository trait.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::{SeasonalRow, SeasonalSet, SeasonalSetId, SeasonalSetInfo};

/// Repository trait for seasonal coefficient sets.
///
/// Usage guards (a set referenced by calculations) are enforced by the
/// service layer, not here.
#[async_trait]
pub trait SeasonalRepository: Send + Sync {
    async fn create_seasonal_set(&self, name: &str) -> RepositoryResult<SeasonalSetInfo>;

    /// Fetch a set with all its rows.
    async fn get_seasonal_set(&self, id: SeasonalSetId) -> RepositoryResult<SeasonalSet>;

    async fn list_seasonal_sets(&self) -> RepositoryResult<Vec<SeasonalSetInfo>>;

    async fn rename_seasonal_set(&self, id: SeasonalSetId, name: &str) -> RepositoryResult<()>;

    /// Replace every row of a set.
    async fn replace_seasonal_rows(
        &self,
        id: SeasonalSetId,
        rows: &[SeasonalRow],
    ) -> RepositoryResult<usize>;

    /// Delete a set and its rows.
    async fn delete_seasonal_set(&self, id: SeasonalSetId) -> RepositoryResult<bool>;
}
