//! Calculation State Controller.
//!
//! Lifecycle: `NEW → IN_PROCESS → DONE`, with `IN_PROCESS → FAILED` when the
//! background run raises and `FAILED → NEW` on an explicit reset. Every status
//! change is a compare-and-swap in the repository; the swap is the only
//! admission mechanism.

use std::sync::Arc;

use log::{error, info};
use serde::Serialize;

use super::coverage;
use super::error::{ServiceError, ServiceResult};
use super::progress::ProgressLog;
use super::tou::{self, EngineOptions, EngineOutcome};
use crate::api::{
    AuditContext, CalcFilters, CalcId, CalcStatus, CalcTou, CalcTouPatch, CalcTouSpec,
    NewCalcTou, ProgressEntry, ReportArtifact, CALC_TOU_LOG_KIND,
};
use crate::db::repository::FullRepository;
use crate::db::services as db_services;

/// A calculation with its filter sets, seasonal set name and progress log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationView {
    #[serde(flatten)]
    pub calc: CalcTou,
    pub filters: CalcFilters,
    pub seasonal_set_name: Option<String>,
    pub log: Vec<ProgressEntry>,
}

fn target(id: CalcId) -> String {
    format!("calc_tou:{}", id)
}

fn result_of<T>(result: &ServiceResult<T>) -> Result<(), String> {
    result.as_ref().map(|_| ()).map_err(|e| e.to_string())
}

/// Check scalar parameters before they are stored.
pub fn validate(calc: &NewCalcTou) -> ServiceResult<()> {
    if calc.name.trim().is_empty() {
        return Err(ServiceError::Validation("Calculation name must not be empty".into()));
    }
    if calc.date_from > calc.date_to {
        return Err(ServiceError::Validation(format!(
            "date_from {} is after date_to {}",
            calc.date_from, calc.date_to
        )));
    }
    if !(calc.exclude_to < calc.exclude_from) {
        return Err(ServiceError::Validation(format!(
            "exclude_to ({}) must be below exclude_from ({})",
            calc.exclude_to, calc.exclude_from
        )));
    }
    if !(calc.exclude_volumes_traffic_less >= 0.0) {
        return Err(ServiceError::Validation(format!(
            "exclude_volumes_traffic_less must be non-negative, got {}",
            calc.exclude_volumes_traffic_less
        )));
    }
    Ok(())
}

async fn ensure_seasonal_set<R: FullRepository + ?Sized>(
    repo: &R,
    calc: &NewCalcTou,
) -> ServiceResult<()> {
    repo.get_seasonal_set(calc.seasonal_set_id)
        .await
        .map(|_| ())
        .map_err(|e| {
            ServiceError::missing_reference(e, format!("Seasonal set {}", calc.seasonal_set_id))
        })
}

fn reject_running(calc: &CalcTou, action: &str) -> ServiceResult<()> {
    if calc.status == CalcStatus::InProcess {
        return Err(ServiceError::Admissibility(format!(
            "Calculation {} cannot be {} while it is running",
            calc.id, action
        )));
    }
    Ok(())
}

/// Store a new calculation in NEW with its filter sets.
pub async fn create<R: FullRepository + ?Sized>(
    repo: &R,
    calc: &NewCalcTou,
    filters: &CalcFilters,
    ctx: &AuditContext,
) -> ServiceResult<CalcTouSpec> {
    let result = create_inner(repo, calc, filters, None, &ctx.username).await;
    let target = match &result {
        Ok(spec) => target(spec.calc.id),
        Err(_) => format!("calc_tou:{}", calc.name),
    };
    db_services::audit(repo, ctx, "calculation.create", target, result_of(&result)).await;
    result
}

async fn create_inner<R: FullRepository + ?Sized>(
    repo: &R,
    calc: &NewCalcTou,
    filters: &CalcFilters,
    parent_id: Option<CalcId>,
    author: &str,
) -> ServiceResult<CalcTouSpec> {
    validate(calc)?;
    ensure_seasonal_set(repo, calc).await?;
    let created = db_services::store_calculation(repo, calc, filters, author, parent_id).await?;
    info!("Created calculation {} '{}'", created.id, created.name);
    Ok(db_services::load_calculation_spec(repo, created.id).await?)
}

pub async fn list<R: FullRepository + ?Sized>(repo: &R) -> ServiceResult<Vec<CalcTou>> {
    Ok(repo.list_calculations().await?)
}

/// Read a calculation together with its progress log.
pub async fn get<R: FullRepository + ?Sized>(repo: &R, id: CalcId) -> ServiceResult<CalculationView> {
    let spec = db_services::load_calculation_spec(repo, id).await?;
    let seasonal_set_name = repo
        .get_seasonal_set(spec.calc.seasonal_set_id)
        .await
        .ok()
        .map(|set| set.name);
    let log = repo.fetch_progress(id.value(), CALC_TOU_LOG_KIND).await?;
    Ok(CalculationView {
        calc: spec.calc,
        filters: spec.filters,
        seasonal_set_name,
        log,
    })
}

/// Apply a partial update. Supplied filter sets replace the stored ones.
pub async fn update<R: FullRepository + ?Sized>(
    repo: &R,
    id: CalcId,
    patch: &CalcTouPatch,
    ctx: &AuditContext,
) -> ServiceResult<CalcTouSpec> {
    let result = update_inner(repo, id, patch).await;
    db_services::audit(repo, ctx, "calculation.update", target(id), result_of(&result)).await;
    result
}

async fn update_inner<R: FullRepository + ?Sized>(
    repo: &R,
    id: CalcId,
    patch: &CalcTouPatch,
) -> ServiceResult<CalcTouSpec> {
    let current = repo.get_calculation(id).await?;
    reject_running(&current, "updated")?;

    let mut fields = NewCalcTou::from_existing(&current);
    patch.apply_to(&mut fields);
    validate(&fields)?;
    if fields.seasonal_set_id != current.seasonal_set_id {
        ensure_seasonal_set(repo, &fields).await?;
    }

    repo.update_calculation(id, &fields).await?;
    if let Some(rps) = &patch.rps {
        repo.replace_rps_filter(id, rps).await?;
    }
    if let Some(operations) = &patch.operation_types {
        repo.replace_operation_filter(id, operations).await?;
    }
    if let Some(stations) = &patch.stations {
        repo.replace_station_filter(id, stations).await?;
    }
    Ok(db_services::load_calculation_spec(repo, id).await?)
}

/// Clone a calculation (any status) into a new NEW calculation.
pub async fn copy<R: FullRepository + ?Sized>(
    repo: &R,
    id: CalcId,
    new_name: Option<String>,
    ctx: &AuditContext,
) -> ServiceResult<CalcTouSpec> {
    let result = copy_inner(repo, id, new_name, &ctx.username).await;
    db_services::audit(repo, ctx, "calculation.copy", target(id), result_of(&result)).await;
    result
}

async fn copy_inner<R: FullRepository + ?Sized>(
    repo: &R,
    id: CalcId,
    new_name: Option<String>,
    author: &str,
) -> ServiceResult<CalcTouSpec> {
    let source = db_services::load_calculation_spec(repo, id).await?;
    let mut fields = NewCalcTou::from_existing(&source.calc);
    fields.name = match new_name {
        Some(name) if !name.trim().is_empty() => name,
        _ => format!("{} (copy)", source.calc.name),
    };
    create_inner(repo, &fields, &source.filters, Some(id), author).await
}

/// Delete a calculation and its filter links.
pub async fn delete<R: FullRepository + ?Sized>(
    repo: &R,
    id: CalcId,
    ctx: &AuditContext,
) -> ServiceResult<()> {
    let result = delete_inner(repo, id).await;
    db_services::audit(repo, ctx, "calculation.delete", target(id), result_of(&result)).await;
    result
}

async fn delete_inner<R: FullRepository + ?Sized>(repo: &R, id: CalcId) -> ServiceResult<()> {
    let current = repo.get_calculation(id).await?;
    reject_running(&current, "deleted")?;
    if !repo.delete_calculation(id).await? {
        return Err(ServiceError::NotFound(format!("Calculation {} not found", id)));
    }
    Ok(())
}

/// Admit a calculation and run it on a background task.
///
/// Admission requires status NEW, an existing seasonal set and a fact for
/// every day of the date range. The NEW → IN_PROCESS swap decides between
/// concurrent starts; the loser is rejected. The returned handle resolves when
/// the run ends and may be dropped.
pub async fn start(
    repo: Arc<dyn FullRepository>,
    id: CalcId,
    options: EngineOptions,
    ctx: &AuditContext,
) -> ServiceResult<tokio::task::JoinHandle<ServiceResult<EngineOutcome>>> {
    let result = admit(repo.as_ref(), id).await;
    db_services::audit(repo.as_ref(), ctx, "calculation.start", target(id), result_of(&result))
        .await;
    result?;

    info!("Calculation {} admitted, starting background run", id);
    let ctx = ctx.clone();
    Ok(tokio::spawn(async move {
        execute(repo.as_ref(), id, options, &ctx).await
    }))
}

async fn admit<R: FullRepository + ?Sized>(repo: &R, id: CalcId) -> ServiceResult<()> {
    let spec = db_services::load_calculation_spec(repo, id).await?;
    let calc = &spec.calc;
    if calc.status != CalcStatus::New {
        return Err(ServiceError::Admissibility(format!(
            "The attempt to calculate the TOU was rejected (status = {}, but need {})",
            calc.status,
            CalcStatus::New
        )));
    }
    ensure_seasonal_set(repo, &NewCalcTou::from_existing(calc)).await?;
    let range = calc.date_range().map_err(ServiceError::Validation)?;
    coverage::ensure_range_covered(repo, range).await?;

    if !repo
        .transition_status(id, CalcStatus::New, CalcStatus::InProcess)
        .await?
    {
        return Err(ServiceError::Admissibility(format!(
            "The attempt to calculate the TOU was rejected (calculation {} is no longer {})",
            id,
            CalcStatus::New
        )));
    }
    Ok(())
}

/// Background part of a start: run the engine, record a failure as FAILED.
pub async fn execute<R: FullRepository + ?Sized>(
    repo: &R,
    id: CalcId,
    options: EngineOptions,
    ctx: &AuditContext,
) -> ServiceResult<EngineOutcome> {
    let progress = ProgressLog::new(repo, id.value(), CALC_TOU_LOG_KIND, ctx.username.clone());
    let result = tou::run(repo, id, options, &progress).await;

    if result.is_err() {
        match repo
            .transition_status(id, CalcStatus::InProcess, CalcStatus::Failed)
            .await
        {
            Ok(true) => info!("Calculation {} marked {}", id, CalcStatus::Failed),
            Ok(false) => error!("Calculation {} was not IN_PROCESS after its run failed", id),
            Err(status_err) => error!("Failed to mark calculation {} as failed: {}", id, status_err),
        }
    }
    db_services::audit(repo, ctx, "calculation.run", target(id), result_of(&result)).await;
    result
}

/// Move a FAILED calculation back to NEW so it can be started again.
pub async fn reset<R: FullRepository + ?Sized>(
    repo: &R,
    id: CalcId,
    ctx: &AuditContext,
) -> ServiceResult<CalcTou> {
    let result = reset_inner(repo, id).await;
    db_services::audit(repo, ctx, "calculation.reset", target(id), result_of(&result)).await;
    result
}

async fn reset_inner<R: FullRepository + ?Sized>(repo: &R, id: CalcId) -> ServiceResult<CalcTou> {
    let current = repo.get_calculation(id).await?;
    if !repo
        .transition_status(id, CalcStatus::Failed, CalcStatus::New)
        .await?
    {
        return Err(ServiceError::Admissibility(format!(
            "Calculation {} cannot be reset (status = {}, but need {})",
            id,
            current.status,
            CalcStatus::Failed
        )));
    }
    Ok(repo.get_calculation(id).await?)
}

/// The stored report of a DONE calculation.
pub async fn report<R: FullRepository + ?Sized>(repo: &R, id: CalcId) -> ServiceResult<ReportArtifact> {
    let calc = repo.get_calculation(id).await?;
    let file_id = calc
        .file_id
        .ok_or_else(|| ServiceError::NotFound(format!("Calculation {} has no report", id)))?;
    let file = repo.get_file(file_id).await?;
    Ok(ReportArtifact {
        file_name: file.file_name,
        bytes: file.bytes,
    })
}
