//! Data Transfer Objects for the HTTP API.
//!
//! Domain types from [`crate::api`] already derive Serialize/Deserialize and
//! are returned as-is; this module only adds request shapes and list wrappers.

use serde::{Deserialize, Serialize};

pub use crate::api::{
    CalcFilters, CalcTou, CalcTouPatch, CalcTouSpec, CoverageEntry, NewCalcTou, SeasonalRow,
    SeasonalSet, SeasonalSetInfo,
};
pub use crate::services::job_tracker::{JobStatus, LogEntry};

fn default_true() -> bool {
    true
}

/// Query parameters of a fact import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportQuery {
    /// Replace existing facts in the date range of each file (default: true)
    #[serde(default = "default_true")]
    pub overwrite: bool,
}

impl Default for ImportQuery {
    fn default() -> Self {
        Self { overwrite: true }
    }
}

/// Response for an accepted background job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAcceptedResponse {
    /// Job ID for tracking the async processing
    pub job_id: String,
    /// Message about the operation
    pub message: String,
}

/// Job status response for async processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: JobStatus,
    pub files_total: usize,
    pub files_done: usize,
    pub logs: Vec<LogEntry>,
    /// Result if finished
    pub result: Option<serde_json::Value>,
}

/// Query parameters of the coverage listing.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CoverageQuery {
    #[serde(default)]
    pub year_from: Option<i32>,
    #[serde(default)]
    pub year_to: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageResponse {
    /// Fully covered months
    pub months: Vec<CoverageEntry>,
    pub total: usize,
}

/// Request body for creating a calculation: scalar fields and filter sets side by side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCalculationRequest {
    #[serde(flatten)]
    pub calc: NewCalcTou,
    #[serde(flatten)]
    pub filters: CalcFilters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculationListResponse {
    pub calculations: Vec<CalcTou>,
    pub total: usize,
}

/// Request body for copying a calculation.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CopyCalculationRequest {
    /// Name of the copy (default: "<name> (copy)")
    #[serde(default)]
    pub name: Option<String>,
}

/// Response of an admitted calculation start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartCalculationResponse {
    pub calc_id: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalSetListResponse {
    pub seasonal_sets: Vec<SeasonalSetInfo>,
    pub total: usize,
}

/// Request body for creating a seasonal set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSeasonalSetRequest {
    pub name: String,
    #[serde(default)]
    pub rows: Vec<SeasonalRow>,
}

/// Request body for modifying a seasonal set; absent fields stay unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateSeasonalSetRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub rows: Option<Vec<SeasonalRow>>,
}

/// Query parameters of a seasonal set import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonalImportQuery {
    /// Name of the new set (default: the uploaded file name)
    #[serde(default)]
    pub name: Option<String>,
}

/// Response of a client mapping upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMappingResponse {
    pub stored: usize,
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status of the service
    pub status: String,
    /// Version of the API
    pub version: String,
    /// Database connection status
    pub database: String,
}
