//! Fact import service: normalization plus the Replace step.
//!
//! Files are processed one after another by [`import_batch`], the single loop
//! behind both the background import job and [`import_files`]. Normalization of
//! each file runs on the blocking pool; the replacement of its period commits
//! delete and insert together.

use log::{info, warn};
use serde::Serialize;

use super::coverage;
use super::error::{ServiceError, ServiceResult};
use crate::api::{AuditContext, ClientUpsertOutcome, CoverageEntry, DateRange, SourceSystem};
use crate::db::repository::FullRepository;
use crate::db::services as db_services;
use crate::ingest::{normalize, NormalizeOptions, NormalizeStats, NormalizedImport, ReferenceIndex};

/// An uploaded file handle.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

/// Result of importing one file.
#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub source: SourceSystem,
    pub file_name: String,
    pub checksum: String,
    #[serde(flatten)]
    pub stats: NormalizeStats,
    pub inserted: usize,
    pub deleted: usize,
    pub range: Option<DateRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clients: Option<ClientUpsertOutcome>,
}

fn action_for(source: SourceSystem) -> &'static str {
    match source {
        SourceSystem::Cognos => "facts.import.cognos",
        SourceSystem::Sap => "facts.import.sap",
    }
}

/// Normalize one file against a fresh reference snapshot and replace its period.
///
/// Does not rebuild coverage; see [`import_files`].
pub async fn import_file<R: FullRepository + ?Sized>(
    repo: &R,
    source: SourceSystem,
    file: UploadedFile,
    overwrite: bool,
    options: NormalizeOptions,
    ctx: &AuditContext,
) -> ServiceResult<ImportOutcome> {
    let file_name = file.file_name.clone();
    let result = import_file_inner(repo, source, file, overwrite, options).await;
    db_services::audit(
        repo,
        ctx,
        action_for(source),
        file_name,
        result.as_ref().map(|_| ()).map_err(|e| e.to_string()),
    )
    .await;
    result
}

async fn import_file_inner<R: FullRepository + ?Sized>(
    repo: &R,
    source: SourceSystem,
    file: UploadedFile,
    overwrite: bool,
    options: NormalizeOptions,
) -> ServiceResult<ImportOutcome> {
    let snapshot = repo.reference_snapshot().await?;
    let normalized: NormalizedImport = tokio::task::spawn_blocking(move || {
        let index = ReferenceIndex::build(&snapshot);
        normalize(source, &file.file_name, &file.bytes, &index, &options)
    })
    .await??;

    let overwrite_range = if overwrite { normalized.range } else { None };
    let replaced = repo
        .replace_facts(source, overwrite_range, &normalized.facts)
        .await?;

    let clients = if normalized.sap_clients.is_empty() {
        None
    } else {
        let outcome = repo.upsert_sap_clients(&normalized.sap_clients).await?;
        info!(
            "SAP client mapping: {} inserted, {} renamed",
            outcome.inserted, outcome.updated
        );
        Some(outcome)
    };

    info!(
        "Imported '{}' ({}): {} facts added, {} replaced",
        normalized.file_name, source, replaced.inserted, replaced.deleted
    );

    Ok(ImportOutcome {
        source,
        file_name: normalized.file_name,
        checksum: normalized.checksum,
        stats: normalized.stats,
        inserted: replaced.inserted,
        deleted: replaced.deleted,
        range: normalized.range,
        clients,
    })
}

/// Step of a multi-file import, reported to the caller as it happens.
#[derive(Debug, Clone, Copy)]
pub enum ImportEvent<'a> {
    FileStarted(&'a str),
    FileImported(&'a ImportOutcome),
    RebuildingCoverage,
}

/// Everything a multi-file import produced, including a failed coverage rebuild.
#[derive(Debug)]
pub struct ImportBatch {
    pub outcomes: Vec<ImportOutcome>,
    /// First failing file and its error; later files are not attempted.
    pub failure: Option<(String, ServiceError)>,
    pub coverage: ServiceResult<Vec<CoverageEntry>>,
}

impl ImportBatch {
    /// The first import error takes precedence over a coverage rebuild error.
    pub fn into_result(self) -> ServiceResult<Vec<ImportOutcome>> {
        if let Some((_, e)) = self.failure {
            return Err(e);
        }
        self.coverage?;
        Ok(self.outcomes)
    }
}

/// Import several files sequentially, then rebuild the coverage index.
///
/// Stops at the first failing file. Coverage is rebuilt in either case since
/// earlier files may already have been written.
#[allow(clippy::too_many_arguments)]
pub async fn import_batch<R, F>(
    repo: &R,
    source: SourceSystem,
    files: Vec<UploadedFile>,
    overwrite: bool,
    options: NormalizeOptions,
    ctx: &AuditContext,
    mut on_event: F,
) -> ImportBatch
where
    R: FullRepository + ?Sized,
    F: FnMut(ImportEvent<'_>),
{
    let mut outcomes = Vec::with_capacity(files.len());
    let mut failure = None;
    for file in files {
        let file_name = file.file_name.clone();
        on_event(ImportEvent::FileStarted(&file_name));
        match import_file(repo, source, file, overwrite, options, ctx).await {
            Ok(outcome) => {
                on_event(ImportEvent::FileImported(&outcome));
                outcomes.push(outcome);
            }
            Err(e) => {
                warn!("Import of {} files stopped at '{}': {}", source, file_name, e);
                failure = Some((file_name, e));
                break;
            }
        }
    }

    on_event(ImportEvent::RebuildingCoverage);
    let coverage = coverage::rebuild(repo, ctx).await;
    if let (Some(_), Err(e)) = (&failure, &coverage) {
        warn!("Coverage rebuild after a failed import also failed: {}", e);
    }

    ImportBatch {
        outcomes,
        failure,
        coverage,
    }
}

/// [`import_batch`] without progress reporting.
pub async fn import_files<R: FullRepository + ?Sized>(
    repo: &R,
    source: SourceSystem,
    files: Vec<UploadedFile>,
    overwrite: bool,
    options: NormalizeOptions,
    ctx: &AuditContext,
) -> ServiceResult<Vec<ImportOutcome>> {
    import_batch(repo, source, files, overwrite, options, ctx, |_| {})
        .await
        .into_result()
}
