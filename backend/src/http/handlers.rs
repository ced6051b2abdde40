//! HTTP handlers for the REST API.
//!
//! Each handler corresponds to an API endpoint and delegates to the service
//! layer. The acting user is taken from the `X-User` header.

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tracing::info;

use super::dto::{
    CalculationListResponse, ClientMappingResponse, CopyCalculationRequest, CoverageQuery,
    CoverageResponse, CreateCalculationRequest, CreateSeasonalSetRequest, HealthResponse,
    ImportQuery, JobAcceptedResponse, JobStatusResponse, SeasonalImportQuery,
    SeasonalSetListResponse, StartCalculationResponse, UpdateSeasonalSetRequest,
};
use super::error::AppError;
use super::state::AppState;
use crate::api::{
    AuditContext, CalcId, CalcTou, CalcTouPatch, CalcTouSpec, SeasonalSet, SeasonalSetId,
    SourceSystem,
};
use crate::db::services as db_services;
use crate::services::job_tracker::{JobKind, JobStatus, LogLevel};
use crate::services::{
    calc_controller, coverage, import_processor, reference, seasonal, CalculationView,
    UploadedFile,
};

/// Result type for handlers.
pub type HandlerResult<T> = Result<Json<T>, AppError>;

/// Header carrying the acting username.
pub const USER_HEADER: &str = "x-user";

const ANONYMOUS: &str = "anonymous";

fn audit_context(headers: &HeaderMap) -> AuditContext {
    let username = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS);
    AuditContext::new(username)
}

async fn read_files(mut multipart: Multipart) -> Result<Vec<UploadedFile>, AppError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read '{}': {}", file_name, e)))?;
        files.push(UploadedFile::new(file_name, bytes.to_vec()));
    }
    if files.is_empty() {
        return Err(AppError::BadRequest("No file was uploaded".into()));
    }
    Ok(files)
}

async fn read_single_file(multipart: Multipart) -> Result<UploadedFile, AppError> {
    let mut files = read_files(multipart).await?;
    if files.len() > 1 {
        return Err(AppError::BadRequest("Exactly one file is expected".into()));
    }
    files
        .pop()
        .ok_or_else(|| AppError::BadRequest("No file was uploaded".into()))
}

fn csv_attachment(file_name: &str, bytes: Vec<u8>) -> Response {
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/csv; charset=utf-8")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Bytes::from(bytes),
    )
        .into_response()
}

// =============================================================================
// Health Check
// =============================================================================

/// GET /health
///
/// Health check endpoint to verify the service is running and database is accessible.
pub async fn health_check(State(state): State<AppState>) -> HandlerResult<HealthResponse> {
    let db_status = match db_services::health_check(state.repository.as_ref()).await {
        Ok(true) => "connected".to_string(),
        Ok(false) => "disconnected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: "v1".to_string(),
        database: db_status,
    }))
}

// =============================================================================
// Fact Imports and Coverage
// =============================================================================

/// POST /v1/imports/{source}
///
/// Import one or more Cognos or SAP files in the background. Returns a job ID.
pub async fn import_facts(
    State(state): State<AppState>,
    Path(source): Path<String>,
    Query(query): Query<ImportQuery>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<JobAcceptedResponse>), AppError> {
    let source: SourceSystem = source.parse().map_err(AppError::BadRequest)?;
    let files = read_files(multipart).await?;
    let ctx = audit_context(&headers);

    let job_id = state
        .job_tracker
        .create_job(JobKind::FactImport(source), files.len());
    info!(
        "Accepted {} import of {} file(s) from {} as job {}",
        source,
        files.len(),
        ctx.username,
        job_id
    );

    let response_job_id = job_id.clone();
    let tracker = state.job_tracker.clone();
    let repo = state.repository.clone();
    let options = state.normalize_options();
    tokio::spawn(async move {
        let _ = import_processor::process_import_job(
            job_id,
            tracker,
            repo,
            source,
            files,
            query.overwrite,
            options,
            ctx,
        )
        .await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAcceptedResponse {
            message: format!(
                "Import started. Track progress at /v1/jobs/{}/logs",
                response_job_id
            ),
            job_id: response_job_id,
        }),
    ))
}

/// POST /v1/coverage/rebuild
///
/// Rebuild the coverage index in the background.
pub async fn rebuild_coverage(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<JobAcceptedResponse>), AppError> {
    let ctx = audit_context(&headers);
    let job_id = state.job_tracker.create_job(JobKind::CoverageRebuild, 0);
    let response_job_id = job_id.clone();
    let tracker = state.job_tracker.clone();
    let repo = state.repository.clone();

    tokio::spawn(async move {
        tracker.log(&job_id, LogLevel::Info, "Rebuilding fact coverage...");
        match coverage::rebuild(repo.as_ref(), &ctx).await {
            Ok(entries) => {
                tracker.log(
                    &job_id,
                    LogLevel::Success,
                    format!("✓ {} complete months", entries.len()),
                );
                tracker.complete_job(&job_id, serde_json::to_value(&entries).ok());
            }
            Err(e) => tracker.fail_job(&job_id, format!("Coverage rebuild failed: {}", e), None),
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAcceptedResponse {
            message: format!("Coverage rebuild started as job {}", response_job_id),
            job_id: response_job_id,
        }),
    ))
}

/// GET /v1/coverage
///
/// Fully covered months, optionally limited to a year window.
pub async fn list_coverage(
    State(state): State<AppState>,
    Query(query): Query<CoverageQuery>,
) -> HandlerResult<CoverageResponse> {
    let months = coverage::list(state.repository.as_ref(), query.year_from, query.year_to).await?;
    let total = months.len();
    Ok(Json(CoverageResponse { months, total }))
}

// =============================================================================
// Calculations
// =============================================================================

/// GET /v1/calculations
pub async fn list_calculations(
    State(state): State<AppState>,
) -> HandlerResult<CalculationListResponse> {
    let calculations = calc_controller::list(state.repository.as_ref()).await?;
    let total = calculations.len();
    Ok(Json(CalculationListResponse {
        calculations,
        total,
    }))
}

/// PUT /v1/calculations
pub async fn create_calculation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateCalculationRequest>,
) -> Result<(StatusCode, Json<CalcTouSpec>), AppError> {
    let ctx = audit_context(&headers);
    let spec = calc_controller::create(
        state.repository.as_ref(),
        &request.calc,
        &request.filters,
        &ctx,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(spec)))
}

/// GET /v1/calculations/{id}
///
/// A calculation with its filters and progress log.
pub async fn get_calculation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> HandlerResult<CalculationView> {
    let view = calc_controller::get(state.repository.as_ref(), CalcId::new(id)).await?;
    Ok(Json(view))
}

/// PATCH /v1/calculations/{id}
pub async fn update_calculation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(patch): Json<CalcTouPatch>,
) -> HandlerResult<CalcTouSpec> {
    let ctx = audit_context(&headers);
    let spec =
        calc_controller::update(state.repository.as_ref(), CalcId::new(id), &patch, &ctx).await?;
    Ok(Json(spec))
}

/// DELETE /v1/calculations/{id}
pub async fn delete_calculation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let ctx = audit_context(&headers);
    calc_controller::delete(state.repository.as_ref(), CalcId::new(id), &ctx).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/calculations/{id}/copy
pub async fn copy_calculation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    body: Option<Json<CopyCalculationRequest>>,
) -> Result<(StatusCode, Json<CalcTouSpec>), AppError> {
    let ctx = audit_context(&headers);
    let name = body.and_then(|Json(request)| request.name);
    let spec =
        calc_controller::copy(state.repository.as_ref(), CalcId::new(id), name, &ctx).await?;
    Ok((StatusCode::CREATED, Json(spec)))
}

/// PUT /v1/calculations/{id}/start
///
/// Admit the calculation and run it in the background. Progress is read back
/// through GET /v1/calculations/{id}.
pub async fn start_calculation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<StartCalculationResponse>), AppError> {
    let ctx = audit_context(&headers);
    let calc_id = CalcId::new(id);
    // The run reports through its progress log; the handle is not awaited.
    let _handle = calc_controller::start(
        state.repository.clone(),
        calc_id,
        state.engine_options(),
        &ctx,
    )
    .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(StartCalculationResponse {
            calc_id: id,
            message: format!(
                "Calculation started. Track progress at /v1/calculations/{}",
                id
            ),
        }),
    ))
}

/// PUT /v1/calculations/{id}/reset
pub async fn reset_calculation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> HandlerResult<CalcTou> {
    let ctx = audit_context(&headers);
    let calc = calc_controller::reset(state.repository.as_ref(), CalcId::new(id), &ctx).await?;
    Ok(Json(calc))
}

/// GET /v1/calculations/{id}/report
///
/// Download the CSV report of a finished calculation.
pub async fn get_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let artifact = calc_controller::report(state.repository.as_ref(), CalcId::new(id)).await?;
    Ok(csv_attachment(&artifact.file_name, artifact.bytes))
}

// =============================================================================
// Seasonal Coefficients
// =============================================================================

/// GET /v1/seasonal-coefficients
pub async fn list_seasonal_sets(
    State(state): State<AppState>,
) -> HandlerResult<SeasonalSetListResponse> {
    let seasonal_sets = seasonal::list(state.repository.as_ref()).await?;
    let total = seasonal_sets.len();
    Ok(Json(SeasonalSetListResponse {
        seasonal_sets,
        total,
    }))
}

/// POST /v1/seasonal-coefficients
pub async fn create_seasonal_set(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateSeasonalSetRequest>,
) -> Result<(StatusCode, Json<SeasonalSet>), AppError> {
    let ctx = audit_context(&headers);
    let set = seasonal::create(state.repository.as_ref(), &request.name, &request.rows, &ctx)
        .await?;
    Ok((StatusCode::CREATED, Json(set)))
}

/// GET /v1/seasonal-coefficients/{id}
pub async fn get_seasonal_set(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> HandlerResult<SeasonalSet> {
    let set = seasonal::get(state.repository.as_ref(), SeasonalSetId::new(id)).await?;
    Ok(Json(set))
}

/// PATCH /v1/seasonal-coefficients/{id}
///
/// Rename the set and/or replace its rows. Refused while a started
/// calculation uses it.
pub async fn update_seasonal_set(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(request): Json<UpdateSeasonalSetRequest>,
) -> HandlerResult<SeasonalSet> {
    let ctx = audit_context(&headers);
    let repo = state.repository.as_ref();
    let id = SeasonalSetId::new(id);

    let mut set = None;
    if let Some(name) = &request.name {
        set = Some(seasonal::rename(repo, id, name, &ctx).await?);
    }
    if let Some(rows) = &request.rows {
        set = Some(seasonal::replace_rows(repo, id, rows, &ctx).await?);
    }
    let set = match set {
        Some(set) => set,
        None => seasonal::get(repo, id).await?,
    };
    Ok(Json(set))
}

/// DELETE /v1/seasonal-coefficients/{id}
pub async fn delete_seasonal_set(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let ctx = audit_context(&headers);
    seasonal::delete(state.repository.as_ref(), SeasonalSetId::new(id), &ctx).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/seasonal-coefficients/import
///
/// Create a new set from an uploaded spreadsheet.
pub async fn import_seasonal_set(
    State(state): State<AppState>,
    Query(query): Query<SeasonalImportQuery>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SeasonalSet>), AppError> {
    let ctx = audit_context(&headers);
    let file = read_single_file(multipart).await?;
    let name = query.name.unwrap_or_else(|| {
        std::path::Path::new(&file.file_name)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.file_name.clone())
    });
    let set = seasonal::import(
        state.repository.as_ref(),
        &name,
        file,
        state.config.pipeline.header_search_rows,
        &ctx,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(set)))
}

/// GET /v1/seasonal-coefficients/{id}/export
pub async fn export_seasonal_set(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let id = SeasonalSetId::new(id);
    let bytes = seasonal::export(state.repository.as_ref(), id).await?;
    Ok(csv_attachment(&format!("seasonal_coefficients_{}.csv", id), bytes))
}

// =============================================================================
// Reference Data
// =============================================================================

/// POST /v1/reference/client-mapping
///
/// Replace the Cognos → SAP client mapping from an uploaded spreadsheet.
pub async fn import_client_mapping(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> HandlerResult<ClientMappingResponse> {
    let ctx = audit_context(&headers);
    let file = read_single_file(multipart).await?;
    let stored = reference::import_client_mapping(
        state.repository.as_ref(),
        file,
        state.config.pipeline.header_search_rows,
        &ctx,
    )
    .await?;
    Ok(Json(ClientMappingResponse { stored }))
}

// =============================================================================
// Async Job Management
// =============================================================================

/// GET /v1/jobs/{job_id}
///
/// Get the current status and logs of a background job.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> HandlerResult<JobStatusResponse> {
    let job = state
        .job_tracker
        .get_job(&job_id)
        .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job_id)))?;

    Ok(Json(JobStatusResponse {
        job_id: job.job_id,
        status: job.status,
        files_total: job.files_total,
        files_done: job.files_done,
        logs: job.logs,
        result: job.result,
    }))
}

/// GET /v1/jobs/{job_id}/logs
///
/// Stream job logs via Server-Sent Events (SSE).
pub async fn stream_job_logs(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    if state.job_tracker.get_job(&job_id).is_none() {
        return Err(AppError::NotFound(format!("Job {} not found", job_id)));
    }

    let tracker = state.job_tracker.clone();
    let stream = async_stream::stream! {
        let mut sent = 0;
        loop {
            for entry in tracker.logs_since(&job_id, sent) {
                sent += 1;
                let event_data = serde_json::to_string(&entry).unwrap_or_default();
                yield Ok(Event::default().data(event_data));
            }

            match tracker.get_job(&job_id) {
                Some(job) if job.status != JobStatus::Running => {
                    // Flush lines appended between the read above and the status change.
                    for entry in job.logs.iter().skip(sent) {
                        let event_data = serde_json::to_string(entry).unwrap_or_default();
                        yield Ok(Event::default().data(event_data));
                    }
                    let final_event = serde_json::json!({
                        "status": job.status,
                        "result": job.result,
                    });
                    yield Ok(Event::default()
                        .event("complete")
                        .data(serde_json::to_string(&final_event).unwrap_or_default()));
                    break;
                }
                Some(_) => {}
                None => break,
            }

            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(1))
            .text("keep-alive"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_context_from_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(audit_context(&headers).username, ANONYMOUS);

        headers.insert(USER_HEADER, HeaderValue::from_static("  petrov "));
        assert_eq!(audit_context(&headers).username, "petrov");
    }
}
