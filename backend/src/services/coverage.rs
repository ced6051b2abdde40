//! Coverage Tracker: which (year, month) periods have a fact for every day.
//!
//! The index is always rebuilt wholesale from distinct report-date counts;
//! it is never maintained incrementally.

use std::sync::Arc;
use std::time::Duration;

use log::{error, info};

use super::error::{ServiceError, ServiceResult};
use crate::api::{days_in_month, AuditContext, CoverageEntry, DateRange, MonthDayCount};
use crate::db::repository::FullRepository;
use crate::db::services as db_services;

/// Keep the months whose distinct-day count equals their calendar length.
pub fn complete_months(counts: &[MonthDayCount]) -> Vec<CoverageEntry> {
    let mut entries: Vec<CoverageEntry> = counts
        .iter()
        .filter(|c| c.distinct_days == days_in_month(c.year, c.month))
        .map(|c| CoverageEntry {
            year: c.year,
            month: c.month,
        })
        .collect();
    entries.sort();
    entries
}

/// Recompute the coverage index from the fact store and persist it.
pub async fn rebuild<R: FullRepository + ?Sized>(
    repo: &R,
    ctx: &AuditContext,
) -> ServiceResult<Vec<CoverageEntry>> {
    let result = rebuild_inner(repo).await;
    db_services::audit(
        repo,
        ctx,
        "coverage.rebuild",
        "fact_coverage",
        result.as_ref().map(|_| ()).map_err(|e| e.to_string()),
    )
    .await;
    result
}

async fn rebuild_inner<R: FullRepository + ?Sized>(repo: &R) -> ServiceResult<Vec<CoverageEntry>> {
    let counts = repo.distinct_days_by_month().await?;
    let entries = complete_months(&counts);
    repo.replace_coverage(&entries).await?;
    info!(
        "Coverage rebuilt: {} of {} months complete",
        entries.len(),
        counts.len()
    );
    Ok(entries)
}

/// Persisted coverage entries, optionally limited to a year window.
pub async fn list<R: FullRepository + ?Sized>(
    repo: &R,
    year_from: Option<i32>,
    year_to: Option<i32>,
) -> ServiceResult<Vec<CoverageEntry>> {
    let entries = repo.list_coverage().await?;
    Ok(entries
        .into_iter()
        .filter(|e| year_from.map_or(true, |y| e.year >= y))
        .filter(|e| year_to.map_or(true, |y| e.year <= y))
        .collect())
}

/// Admission check: every day of `range` must have at least one fact.
pub async fn ensure_range_covered<R: FullRepository + ?Sized>(
    repo: &R,
    range: DateRange,
) -> ServiceResult<()> {
    let covered = repo.count_distinct_dates(range).await?;
    let required = range.days() as usize;
    if covered != required {
        return Err(ServiceError::Admissibility(format!(
            "Fact coverage is incomplete for {}: {} of {} days",
            range, covered, required
        )));
    }
    Ok(())
}

/// Spawn the periodic rebuild task. The first rebuild runs immediately.
pub fn spawn_periodic(
    repo: Arc<dyn FullRepository>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = rebuild(repo.as_ref(), &AuditContext::system()).await {
                error!("Periodic coverage rebuild failed: {}", e);
            }
        }
    })
}
