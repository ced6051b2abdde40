//! Calculation engine run: extract, enrich, filter, aggregate, project,
//! apply seasonality, render and store the report.
//!
//! CPU-bound stages run on the blocking pool; every stage boundary writes a
//! progress entry.

use std::time::{Duration, Instant};

use log::debug;
use serde::Serialize;

use super::aggregate::aggregate;
use super::projection::project;
use super::records::enrich_facts;
use super::report::{self, ReportLayout};
use super::seasonality::apply_seasonality;
use super::traffic::{apply_exclusions, assign_traffic_share, Thresholds};
use crate::api::{CalcId, CanonicalFact, FactQuery, FileId};
use crate::config::PipelineSettings;
use crate::db::repository::FullRepository;
use crate::db::services as db_services;
use crate::ingest::ReferenceIndex;
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::progress::ProgressLog;

/// Engine tuning taken from the `[pipeline]` configuration section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub fetch_chunk_size: usize,
    pub legacy_group_key: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&PipelineSettings::default())
    }
}

impl From<&PipelineSettings> for EngineOptions {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            fetch_chunk_size: settings.fetch_chunk_size.max(1),
            legacy_group_key: settings.legacy_group_key,
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineOutcome {
    pub file_id: FileId,
    pub file_name: String,
    pub facts_read: usize,
    pub records_kept: usize,
    pub groups: usize,
    pub groups_without_coefficients: usize,
    pub report_rows: usize,
}

/// Read every fact matching `query`, one page at a time.
pub async fn extract<R: FullRepository + ?Sized>(
    repo: &R,
    query: &FactQuery,
    chunk_size: usize,
) -> ServiceResult<Vec<CanonicalFact>> {
    let chunk_size = chunk_size.max(1);
    let mut facts = Vec::new();
    loop {
        let page = repo.fetch_facts_page(query, facts.len(), chunk_size).await?;
        let fetched = page.len();
        facts.extend(page);
        debug!("Fetched {} facts ({} total)", fetched, facts.len());
        if fetched < chunk_size {
            break;
        }
    }
    Ok(facts)
}

/// `H:MM:SS`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

/// Run the calculation and mark it DONE. The calculation must already be IN_PROCESS.
///
/// The progress log always ends with a finish entry; on failure it carries the error.
pub async fn run<R: FullRepository + ?Sized>(
    repo: &R,
    calc_id: CalcId,
    options: EngineOptions,
    progress: &ProgressLog<'_, R>,
) -> ServiceResult<EngineOutcome> {
    let started = Instant::now();
    progress.start("Start function \"calc_tou\"").await;

    let result = execute(repo, calc_id, options, progress).await;

    let elapsed = format_elapsed(started.elapsed());
    match &result {
        Ok(_) => {
            progress
                .finish(format!("Finished function (execution period {})", elapsed))
                .await
        }
        Err(e) => {
            progress.error(format!("Calculation failed: {}", e)).await;
            progress
                .finish(format!(
                    "Finished function with error (execution period {}): {}",
                    elapsed, e
                ))
                .await
        }
    }
    result
}

async fn execute<R: FullRepository + ?Sized>(
    repo: &R,
    calc_id: CalcId,
    options: EngineOptions,
    progress: &ProgressLog<'_, R>,
) -> ServiceResult<EngineOutcome> {
    let spec = db_services::load_calculation_spec(repo, calc_id).await?;
    let calc = spec.calc.clone();
    let query = spec.fact_query().map_err(ServiceError::Validation)?;
    let seasonal = repo
        .get_seasonal_set(calc.seasonal_set_id)
        .await
        .map_err(|e| {
            ServiceError::missing_reference(e, format!("Seasonal set {}", calc.seasonal_set_id))
        })?;
    let snapshot = repo.reference_snapshot().await?;
    let layout = ReportLayout::of(&calc);

    let facts = extract(repo, &query, options.fetch_chunk_size).await?;
    let facts_read = facts.len();

    let thresholds = Thresholds::of(&calc);
    let mode = calc.group_data;
    let records = tokio::task::spawn_blocking(move || {
        let index = ReferenceIndex::build(&snapshot);
        let mut records = enrich_facts(facts, &index, mode);
        assign_traffic_share(&mut records);
        apply_exclusions(records, &thresholds)
    })
    .await?;
    let records_kept = records.len();
    progress
        .info(format!(
            "Received {} rows from the \"fact\", after applying a filter on calc_tou parameters.",
            records_kept
        ))
        .await;

    let groups = tokio::task::spawn_blocking(move || aggregate(&records)).await?;
    let group_count = groups.len();
    progress
        .info(format!(
            "After aggregation - {} rows, {} cols.",
            group_count,
            layout.aggregation_width()
        ))
        .await;

    let horizon = calc.amount_year_period;
    let projected: Vec<_> = groups
        .into_iter()
        .map(|group| {
            let projection = project(&group.stats, horizon);
            (group, projection)
        })
        .collect();
    progress
        .info(format!(
            "After add {} year periods - {} rows, {} cols.",
            horizon,
            projected.len(),
            layout.projection_width()
        ))
        .await;

    let (rows, dropped) = apply_seasonality(projected, &seasonal);
    if dropped > 0 {
        progress
            .warning(format!(
                "{} groups have no coefficients in seasonal set \"{}\" and were left out",
                dropped, seasonal.name
            ))
            .await;
    }
    progress
        .info(format!(
            "After merged seasonal coefficients: {} rows, {} cols.",
            rows.len(),
            layout.seasonal_width()
        ))
        .await;

    let file_name = report::file_name(calc.date_from, calc.date_to);
    let report_rows = rows.len();
    progress
        .info(format!(
            "Started saving result in DB ({} - {} rows, {} cols).",
            file_name,
            report_rows,
            layout.width()
        ))
        .await;

    let legacy = options.legacy_group_key;
    let bytes = tokio::task::spawn_blocking(move || report::render_csv(&calc, &rows, legacy))
        .await?
        .map_err(|e| ServiceError::Internal(format!("Failed to render report: {}", e)))?;

    let file_id = repo.store_file(&file_name, &bytes).await?;
    if !repo.complete_calculation(calc_id, file_id).await? {
        return Err(ServiceError::Internal(format!(
            "Calculation {} left IN_PROCESS before its report was stored",
            calc_id
        )));
    }

    Ok(EngineOutcome {
        file_id,
        file_name,
        facts_read,
        records_kept,
        groups: group_count,
        groups_without_coefficients: dropped,
        report_rows,
    })
}
