//! Calculation (CalcTOU) repository trait.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::{
    CalcFilters, CalcId, CalcStatus, CalcTou, FileId, NewCalcTou, OperationType, SeasonalSetId,
};

/// Repository trait for calculation records and their filter links.
#[async_trait]
pub trait CalculationRepository: Send + Sync {
    /// Insert a calculation in status NEW.
    async fn create_calculation(
        &self,
        calc: &NewCalcTou,
        author: &str,
        parent_id: Option<CalcId>,
    ) -> RepositoryResult<CalcTou>;

    /// Fetch a calculation by id.
    ///
    /// # Returns
    /// * `Err(RepositoryError::NotFound)` - If no calculation has this id
    async fn get_calculation(&self, id: CalcId) -> RepositoryResult<CalcTou>;

    /// List all calculations, newest first.
    async fn list_calculations(&self) -> RepositoryResult<Vec<CalcTou>>;

    /// Overwrite the scalar fields of a calculation (status and file pointer excluded).
    async fn update_calculation(&self, id: CalcId, calc: &NewCalcTou) -> RepositoryResult<CalcTou>;

    /// Delete a calculation and its filter links.
    ///
    /// # Returns
    /// * `Ok(true)` - If a row was deleted
    async fn delete_calculation(&self, id: CalcId) -> RepositoryResult<bool>;

    /// Read the three filter sets of a calculation.
    async fn get_filters(&self, id: CalcId) -> RepositoryResult<CalcFilters>;

    /// Replace the rolling-stock filter set (delete-all-then-insert).
    async fn replace_rps_filter(&self, id: CalcId, rps: &[String]) -> RepositoryResult<()>;

    /// Replace the operation-type filter set (delete-all-then-insert).
    async fn replace_operation_filter(
        &self,
        id: CalcId,
        operations: &[OperationType],
    ) -> RepositoryResult<()>;

    /// Replace the station filter set (delete-all-then-insert).
    async fn replace_station_filter(&self, id: CalcId, stations: &[String]) -> RepositoryResult<()>;

    /// Conditionally move a calculation from `from` to `to`.
    ///
    /// This is a compare-and-swap: the update only applies while the stored
    /// status equals `from`.
    ///
    /// # Returns
    /// * `Ok(true)` - If exactly this call performed the transition
    /// * `Ok(false)` - If the stored status differed (or the row is gone)
    async fn transition_status(
        &self,
        id: CalcId,
        from: CalcStatus,
        to: CalcStatus,
    ) -> RepositoryResult<bool>;

    /// Attach the report file and move IN_PROCESS → DONE in one conditional update.
    async fn complete_calculation(&self, id: CalcId, file_id: FileId) -> RepositoryResult<bool>;

    /// Calculations referencing a seasonal coefficient set, with their status.
    async fn calculations_using_seasonal_set(
        &self,
        set_id: SeasonalSetId,
    ) -> RepositoryResult<Vec<(CalcId, CalcStatus)>>;
}
