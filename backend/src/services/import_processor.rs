//! Background processing of multi-file fact imports.
//!
//! Runs [`fact_import::import_batch`] and mirrors its progress into the job
//! tracker so clients can follow it over SSE.

use std::sync::Arc;

use crate::api::{AuditContext, SourceSystem};
use crate::db::repository::FullRepository;
use crate::ingest::NormalizeOptions;
use crate::services::fact_import::{self, ImportEvent, ImportOutcome, UploadedFile};
use crate::services::job_tracker::{JobTracker, LogLevel};

fn outcomes_json(outcomes: &[ImportOutcome]) -> Option<serde_json::Value> {
    serde_json::to_value(outcomes).ok()
}

fn log_event(tracker: &JobTracker, job_id: &str, event: ImportEvent<'_>) {
    match event {
        ImportEvent::FileStarted(file_name) => {
            tracker.log(job_id, LogLevel::Info, format!("Processing '{}'...", file_name))
        }
        ImportEvent::FileImported(outcome) => {
            tracker.log(
                job_id,
                LogLevel::Success,
                format!(
                    "✓ '{}': {} rows read, {} facts inserted, {} replaced",
                    outcome.file_name, outcome.stats.rows_read, outcome.inserted, outcome.deleted
                ),
            );
            let joins = &outcome.stats.joins;
            if joins.dropped_rolling_stock > 0 || joins.dropped_client > 0 {
                tracker.log(
                    job_id,
                    LogLevel::Warning,
                    format!(
                        "'{}': {} rows dropped for unknown rolling stock, {} for unmapped clients",
                        outcome.file_name, joins.dropped_rolling_stock, joins.dropped_client
                    ),
                );
            }
            tracker.advance(job_id);
        }
        ImportEvent::RebuildingCoverage => {
            tracker.log(job_id, LogLevel::Info, "Rebuilding fact coverage...")
        }
    }
}

/// Import `files` for `source` and report into the job `job_id`.
///
/// Stops at the first failing file; earlier files stay imported.
#[allow(clippy::too_many_arguments)]
pub async fn process_import_job(
    job_id: String,
    tracker: JobTracker,
    repo: Arc<dyn FullRepository>,
    source: SourceSystem,
    files: Vec<UploadedFile>,
    overwrite: bool,
    options: NormalizeOptions,
    ctx: AuditContext,
) -> Result<Vec<ImportOutcome>, String> {
    tracker.log(
        &job_id,
        LogLevel::Info,
        format!(
            "Starting {} import of {} file(s) (overwrite = {})",
            source,
            files.len(),
            overwrite
        ),
    );

    let batch = fact_import::import_batch(
        repo.as_ref(),
        source,
        files,
        overwrite,
        options,
        &ctx,
        |event| log_event(&tracker, &job_id, event),
    )
    .await;

    match &batch.coverage {
        Ok(entries) => tracker.log(
            &job_id,
            LogLevel::Success,
            format!("✓ Coverage rebuilt: {} complete months", entries.len()),
        ),
        Err(e) => tracker.log(
            &job_id,
            LogLevel::Warning,
            format!("Coverage rebuild failed: {}", e),
        ),
    }

    let partial = outcomes_json(&batch.outcomes);
    let failure = batch
        .failure
        .as_ref()
        .map(|(file_name, e)| format!("Import of '{}' failed: {}", file_name, e));
    match batch.into_result() {
        Ok(outcomes) => {
            tracker.log(&job_id, LogLevel::Success, "✓ Import completed");
            tracker.complete_job(&job_id, partial);
            Ok(outcomes)
        }
        Err(e) => {
            let msg = failure.unwrap_or_else(|| e.to_string());
            tracker.fail_job(&job_id, &msg, partial);
            Err(msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::LocalRepository;
    use crate::services::job_tracker::{JobKind, JobStatus};

    #[tokio::test]
    async fn test_failed_file_fails_job_and_still_rebuilds_coverage() {
        let tracker = JobTracker::new();
        let repo: Arc<dyn FullRepository> = Arc::new(LocalRepository::new());
        let job_id = tracker.create_job(JobKind::FactImport(SourceSystem::Cognos), 1);

        let files = vec![UploadedFile::new("broken.csv", b"nothing;useful\n1;2\n".to_vec())];
        let result = process_import_job(
            job_id.clone(),
            tracker.clone(),
            repo,
            SourceSystem::Cognos,
            files,
            false,
            NormalizeOptions::default(),
            AuditContext::system(),
        )
        .await;

        assert!(result.is_err());
        let job = tracker.get_job(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.files_done, 0);
        assert!(job
            .logs
            .iter()
            .any(|entry| entry.message.starts_with("✓ Coverage rebuilt")));
    }
}
