//! Repository-agnostic database operations.
//!
//! These functions combine several repository calls that belong together
//! regardless of the storage backend: a calculation with its filter links and
//! best-effort audit writes.

use chrono::Utc;
use log::warn;

use super::repository::{FullRepository, RepositoryResult};
use crate::api::{
    AuditContext, AuditEntry, CalcFilters, CalcId, CalcTou, CalcTouSpec, NewCalcTou,
};

/// Check if the database connection is healthy.
pub async fn health_check<R: FullRepository + ?Sized>(repo: &R) -> RepositoryResult<bool> {
    repo.health_check().await
}

/// Read a calculation together with its three filter sets.
pub async fn load_calculation_spec<R: FullRepository + ?Sized>(
    repo: &R,
    id: CalcId,
) -> RepositoryResult<CalcTouSpec> {
    let calc = repo.get_calculation(id).await?;
    let filters = repo.get_filters(id).await?;
    Ok(CalcTouSpec { calc, filters })
}

/// Insert a calculation and write all of its filter links.
pub async fn store_calculation<R: FullRepository + ?Sized>(
    repo: &R,
    calc: &NewCalcTou,
    filters: &CalcFilters,
    author: &str,
    parent_id: Option<CalcId>,
) -> RepositoryResult<CalcTou> {
    let created = repo.create_calculation(calc, author, parent_id).await?;
    write_filters(repo, created.id, filters).await?;
    Ok(created)
}

/// Replace all three filter sets of a calculation.
pub async fn write_filters<R: FullRepository + ?Sized>(
    repo: &R,
    id: CalcId,
    filters: &CalcFilters,
) -> RepositoryResult<()> {
    repo.replace_rps_filter(id, &filters.rps).await?;
    repo.replace_operation_filter(id, &filters.operation_types)
        .await?;
    repo.replace_station_filter(id, &filters.stations).await?;
    Ok(())
}

/// Append an audit entry. Failures are logged and swallowed so that an
/// unavailable audit table never fails the audited operation.
pub async fn audit<R: FullRepository + ?Sized>(
    repo: &R,
    ctx: &AuditContext,
    action: &str,
    target: impl Into<String>,
    result: Result<(), String>,
) {
    let (succeeded, detail) = match result {
        Ok(()) => (true, None),
        Err(message) => (false, Some(message)),
    };
    let entry = AuditEntry {
        timestamp: Utc::now(),
        username: ctx.username.clone(),
        action: action.to_string(),
        target: target.into(),
        succeeded,
        detail,
    };
    if let Err(e) = repo.record_audit(&entry).await {
        warn!("Failed to record audit entry for {}: {}", action, e);
    }
}
