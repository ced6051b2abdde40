//! Reference dictionary repository trait.

use async_trait::async_trait;

use super::error::RepositoryResult;
use crate::api::{
    BranchRecord, CargoGroupRecord, ClientMapping, ClientUpsertOutcome, FreightRecord,
    ReferenceData, RollingStockModel, StationRecord,
};

/// Repository trait for the dictionaries consulted by the reference resolver.
#[async_trait]
pub trait ReferenceRepository: Send + Sync {
    /// Read every dictionary at once so a run sees a single consistent version.
    async fn reference_snapshot(&self) -> RepositoryResult<ReferenceData>;

    async fn replace_stations(&self, stations: &[StationRecord]) -> RepositoryResult<usize>;

    async fn replace_branches(&self, branches: &[BranchRecord]) -> RepositoryResult<usize>;

    async fn replace_rolling_stock(&self, models: &[RollingStockModel]) -> RepositoryResult<usize>;

    async fn replace_freight(&self, freight: &[FreightRecord]) -> RepositoryResult<usize>;

    async fn replace_cargo_groups(&self, groups: &[CargoGroupRecord]) -> RepositoryResult<usize>;

    /// Replace the whole Cognos ↔ SAP client mapping table.
    async fn replace_client_mapping(&self, clients: &[ClientMapping]) -> RepositoryResult<usize>;

    /// Insert unknown SAP client ids and rename known ones whose display name changed.
    ///
    /// # Arguments
    /// * `clients` - (SAP id, display name) pairs, already deduplicated
    async fn upsert_sap_clients(
        &self,
        clients: &[(String, String)],
    ) -> RepositoryResult<ClientUpsertOutcome>;
}
