//! In-memory local repository implementation.
//!
//! This module provides a local implementation of all repository traits
//! suitable for unit testing and local development. All data is stored in memory
//! behind a single lock, so every trait method is atomic with respect to the others.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::api::*;
use crate::db::repository::*;

/// In-memory local repository.
///
/// # Example
/// ```
/// use tou_backend::db::repositories::LocalRepository;
///
/// let repo = LocalRepository::new();
/// assert_eq!(repo.fact_count(), 0);
/// ```
#[derive(Clone)]
pub struct LocalRepository {
    data: Arc<RwLock<LocalData>>,
}

struct LocalData {
    facts: Vec<CanonicalFact>,
    coverage: Vec<CoverageEntry>,

    calculations: BTreeMap<CalcId, CalcTou>,
    rps_links: HashMap<CalcId, Vec<String>>,
    operation_links: HashMap<CalcId, Vec<OperationType>>,
    station_links: HashMap<CalcId, Vec<String>>,

    reference: ReferenceData,
    seasonal_sets: BTreeMap<SeasonalSetId, SeasonalSet>,

    progress: HashMap<(i64, String), Vec<ProgressEntry>>,
    audit: Vec<AuditEntry>,
    files: HashMap<FileId, StoredFile>,

    // ID counters
    next_calc_id: i64,
    next_set_id: i64,
    next_file_id: i64,

    // Connection health
    is_healthy: bool,
}

impl Default for LocalData {
    fn default() -> Self {
        Self {
            facts: Vec::new(),
            coverage: Vec::new(),
            calculations: BTreeMap::new(),
            rps_links: HashMap::new(),
            operation_links: HashMap::new(),
            station_links: HashMap::new(),
            reference: ReferenceData::default(),
            seasonal_sets: BTreeMap::new(),
            progress: HashMap::new(),
            audit: Vec::new(),
            files: HashMap::new(),
            next_calc_id: 1,
            next_set_id: 1,
            next_file_id: 1,
            is_healthy: true,
        }
    }
}

impl LocalRepository {
    /// Create a new empty local repository.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(LocalData::default())),
        }
    }

    /// Set the health status for testing connection failures.
    pub fn set_healthy(&self, healthy: bool) {
        self.data.write().is_healthy = healthy;
    }

    /// Clear all data from the repository.
    pub fn clear(&self) {
        let mut data = self.data.write();
        *data = LocalData {
            is_healthy: data.is_healthy,
            ..Default::default()
        };
    }

    /// Get the number of facts stored.
    pub fn fact_count(&self) -> usize {
        self.data.read().facts.len()
    }

    /// Force a calculation into a status, bypassing the transition guard.
    ///
    /// Intended for test setup.
    pub fn force_status(&self, id: CalcId, status: CalcStatus) -> bool {
        let mut data = self.data.write();
        match data.calculations.get_mut(&id) {
            Some(calc) => {
                calc.status = status;
                true
            }
            None => false,
        }
    }

    /// Helper to check health and return error if unhealthy.
    fn check_health(&self) -> RepositoryResult<()> {
        if !self.data.read().is_healthy {
            return Err(RepositoryError::connection("Database is not healthy"));
        }
        Ok(())
    }

    fn calc_not_found(id: CalcId) -> RepositoryError {
        RepositoryError::not_found_with_context(
            format!("Calculation {} not found", id),
            ErrorContext::default()
                .with_entity("calc_tou")
                .with_entity_id(id),
        )
    }

    fn set_not_found(id: SeasonalSetId) -> RepositoryError {
        RepositoryError::not_found_with_context(
            format!("Seasonal coefficient set {} not found", id),
            ErrorContext::default()
                .with_entity("seasonal_set")
                .with_entity_id(id),
        )
    }
}

impl Default for LocalRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn set_info(set: &SeasonalSet) -> SeasonalSetInfo {
    SeasonalSetInfo {
        id: set.id,
        name: set.name.clone(),
        row_count: set.rows.len(),
    }
}

#[async_trait]
impl FactRepository for LocalRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        Ok(self.data.read().is_healthy)
    }

    async fn replace_facts(
        &self,
        source: SourceSystem,
        overwrite: Option<DateRange>,
        facts: &[CanonicalFact],
    ) -> RepositoryResult<FactReplaceOutcome> {
        self.check_health()?;
        let mut data = self.data.write();

        let deleted = match overwrite {
            Some(range) => {
                let before = data.facts.len();
                data.facts
                    .retain(|f| !(f.load_from == source && range.contains(f.date_rep)));
                before - data.facts.len()
            }
            None => 0,
        };
        data.facts.extend(facts.iter().cloned());

        Ok(FactReplaceOutcome {
            deleted,
            inserted: facts.len(),
        })
    }

    async fn fetch_facts_page(
        &self,
        query: &FactQuery,
        offset: usize,
        limit: usize,
    ) -> RepositoryResult<Vec<CanonicalFact>> {
        self.check_health()?;
        let data = self.data.read();
        Ok(data
            .facts
            .iter()
            .filter(|f| query.matches(f))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_distinct_dates(&self, range: DateRange) -> RepositoryResult<usize> {
        self.check_health()?;
        let data = self.data.read();
        let dates: BTreeSet<NaiveDate> = data
            .facts
            .iter()
            .filter(|f| range.contains(f.date_rep))
            .map(|f| f.date_rep)
            .collect();
        Ok(dates.len())
    }

    async fn distinct_days_by_month(&self) -> RepositoryResult<Vec<MonthDayCount>> {
        self.check_health()?;
        let data = self.data.read();
        let dates: BTreeSet<NaiveDate> = data.facts.iter().map(|f| f.date_rep).collect();

        let mut counts: BTreeMap<(i32, u32), u32> = BTreeMap::new();
        for date in dates {
            *counts.entry((date.year(), date.month())).or_insert(0) += 1;
        }

        Ok(counts
            .into_iter()
            .map(|((year, month), distinct_days)| MonthDayCount {
                year,
                month,
                distinct_days,
            })
            .collect())
    }

    async fn count_facts(&self) -> RepositoryResult<usize> {
        self.check_health()?;
        Ok(self.data.read().facts.len())
    }

    async fn replace_coverage(&self, entries: &[CoverageEntry]) -> RepositoryResult<()> {
        self.check_health()?;
        let mut sorted = entries.to_vec();
        sorted.sort();
        sorted.dedup();
        self.data.write().coverage = sorted;
        Ok(())
    }

    async fn list_coverage(&self) -> RepositoryResult<Vec<CoverageEntry>> {
        self.check_health()?;
        Ok(self.data.read().coverage.clone())
    }
}

#[async_trait]
impl CalculationRepository for LocalRepository {
    async fn create_calculation(
        &self,
        calc: &NewCalcTou,
        author: &str,
        parent_id: Option<CalcId>,
    ) -> RepositoryResult<CalcTou> {
        self.check_health()?;
        let mut data = self.data.write();
        let id = CalcId(data.next_calc_id);
        data.next_calc_id += 1;

        let now = Utc::now();
        let record = CalcTou {
            id,
            name: calc.name.clone(),
            author: author.to_string(),
            status: CalcStatus::New,
            date_from: calc.date_from,
            date_to: calc.date_to,
            base_year: calc.base_year,
            group_data: calc.group_data,
            exclude_from: calc.exclude_from,
            exclude_to: calc.exclude_to,
            exclude_volumes_traffic_less: calc.exclude_volumes_traffic_less,
            amount_year_period: calc.amount_year_period,
            seasonal_set_id: calc.seasonal_set_id,
            branch_id: calc.branch_id,
            parent_id,
            file_id: None,
            created_at: now,
            updated_at: now,
        };
        data.calculations.insert(id, record.clone());
        Ok(record)
    }

    async fn get_calculation(&self, id: CalcId) -> RepositoryResult<CalcTou> {
        self.check_health()?;
        self.data
            .read()
            .calculations
            .get(&id)
            .cloned()
            .ok_or_else(|| Self::calc_not_found(id))
    }

    async fn list_calculations(&self) -> RepositoryResult<Vec<CalcTou>> {
        self.check_health()?;
        Ok(self.data.read().calculations.values().rev().cloned().collect())
    }

    async fn update_calculation(&self, id: CalcId, calc: &NewCalcTou) -> RepositoryResult<CalcTou> {
        self.check_health()?;
        let mut data = self.data.write();
        let record = data
            .calculations
            .get_mut(&id)
            .ok_or_else(|| Self::calc_not_found(id))?;

        record.name = calc.name.clone();
        record.date_from = calc.date_from;
        record.date_to = calc.date_to;
        record.base_year = calc.base_year;
        record.group_data = calc.group_data;
        record.exclude_from = calc.exclude_from;
        record.exclude_to = calc.exclude_to;
        record.exclude_volumes_traffic_less = calc.exclude_volumes_traffic_less;
        record.amount_year_period = calc.amount_year_period;
        record.seasonal_set_id = calc.seasonal_set_id;
        record.branch_id = calc.branch_id;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn delete_calculation(&self, id: CalcId) -> RepositoryResult<bool> {
        self.check_health()?;
        let mut data = self.data.write();
        data.rps_links.remove(&id);
        data.operation_links.remove(&id);
        data.station_links.remove(&id);
        Ok(data.calculations.remove(&id).is_some())
    }

    async fn get_filters(&self, id: CalcId) -> RepositoryResult<CalcFilters> {
        self.check_health()?;
        let data = self.data.read();
        if !data.calculations.contains_key(&id) {
            return Err(Self::calc_not_found(id));
        }
        Ok(CalcFilters {
            rps: data.rps_links.get(&id).cloned().unwrap_or_default(),
            operation_types: data.operation_links.get(&id).cloned().unwrap_or_default(),
            stations: data.station_links.get(&id).cloned().unwrap_or_default(),
        })
    }

    async fn replace_rps_filter(&self, id: CalcId, rps: &[String]) -> RepositoryResult<()> {
        self.check_health()?;
        let mut data = self.data.write();
        if !data.calculations.contains_key(&id) {
            return Err(Self::calc_not_found(id));
        }
        data.rps_links.insert(id, rps.to_vec());
        Ok(())
    }

    async fn replace_operation_filter(
        &self,
        id: CalcId,
        operations: &[OperationType],
    ) -> RepositoryResult<()> {
        self.check_health()?;
        let mut data = self.data.write();
        if !data.calculations.contains_key(&id) {
            return Err(Self::calc_not_found(id));
        }
        data.operation_links.insert(id, operations.to_vec());
        Ok(())
    }

    async fn replace_station_filter(&self, id: CalcId, stations: &[String]) -> RepositoryResult<()> {
        self.check_health()?;
        let mut data = self.data.write();
        if !data.calculations.contains_key(&id) {
            return Err(Self::calc_not_found(id));
        }
        data.station_links.insert(id, stations.to_vec());
        Ok(())
    }

    async fn transition_status(
        &self,
        id: CalcId,
        from: CalcStatus,
        to: CalcStatus,
    ) -> RepositoryResult<bool> {
        self.check_health()?;
        let mut data = self.data.write();
        match data.calculations.get_mut(&id) {
            Some(calc) if calc.status == from => {
                calc.status = to;
                calc.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete_calculation(&self, id: CalcId, file_id: FileId) -> RepositoryResult<bool> {
        self.check_health()?;
        let mut data = self.data.write();
        match data.calculations.get_mut(&id) {
            Some(calc) if calc.status == CalcStatus::InProcess => {
                calc.status = CalcStatus::Done;
                calc.file_id = Some(file_id);
                calc.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn calculations_using_seasonal_set(
        &self,
        set_id: SeasonalSetId,
    ) -> RepositoryResult<Vec<(CalcId, CalcStatus)>> {
        self.check_health()?;
        Ok(self
            .data
            .read()
            .calculations
            .values()
            .filter(|c| c.seasonal_set_id == set_id)
            .map(|c| (c.id, c.status))
            .collect())
    }
}

#[async_trait]
impl ReferenceRepository for LocalRepository {
    async fn reference_snapshot(&self) -> RepositoryResult<ReferenceData> {
        self.check_health()?;
        Ok(self.data.read().reference.clone())
    }

    async fn replace_stations(&self, stations: &[StationRecord]) -> RepositoryResult<usize> {
        self.check_health()?;
        self.data.write().reference.stations = stations.to_vec();
        Ok(stations.len())
    }

    async fn replace_branches(&self, branches: &[BranchRecord]) -> RepositoryResult<usize> {
        self.check_health()?;
        self.data.write().reference.branches = branches.to_vec();
        Ok(branches.len())
    }

    async fn replace_rolling_stock(&self, models: &[RollingStockModel]) -> RepositoryResult<usize> {
        self.check_health()?;
        self.data.write().reference.rolling_stock = models.to_vec();
        Ok(models.len())
    }

    async fn replace_freight(&self, freight: &[FreightRecord]) -> RepositoryResult<usize> {
        self.check_health()?;
        self.data.write().reference.freight = freight.to_vec();
        Ok(freight.len())
    }

    async fn replace_cargo_groups(&self, groups: &[CargoGroupRecord]) -> RepositoryResult<usize> {
        self.check_health()?;
        self.data.write().reference.cargo_groups = groups.to_vec();
        Ok(groups.len())
    }

    async fn replace_client_mapping(&self, clients: &[ClientMapping]) -> RepositoryResult<usize> {
        self.check_health()?;
        self.data.write().reference.clients = clients.to_vec();
        Ok(clients.len())
    }

    async fn upsert_sap_clients(
        &self,
        clients: &[(String, String)],
    ) -> RepositoryResult<ClientUpsertOutcome> {
        self.check_health()?;
        let mut data = self.data.write();
        let mut outcome = ClientUpsertOutcome::default();

        for (sap_id, name) in clients {
            match data
                .reference
                .clients
                .iter_mut()
                .find(|c| &c.sap_id == sap_id)
            {
                Some(existing) if &existing.name != name => {
                    existing.name = name.clone();
                    outcome.updated += 1;
                }
                Some(_) => {}
                None => {
                    data.reference.clients.push(ClientMapping {
                        cognos_id: None,
                        sap_id: sap_id.clone(),
                        name: name.clone(),
                    });
                    outcome.inserted += 1;
                }
            }
        }
        Ok(outcome)
    }
}

#[async_trait]
impl SeasonalRepository for LocalRepository {
    async fn create_seasonal_set(&self, name: &str) -> RepositoryResult<SeasonalSetInfo> {
        self.check_health()?;
        let mut data = self.data.write();
        let id = SeasonalSetId(data.next_set_id);
        data.next_set_id += 1;
        let set = SeasonalSet {
            id,
            name: name.to_string(),
            rows: Vec::new(),
        };
        let info = set_info(&set);
        data.seasonal_sets.insert(id, set);
        Ok(info)
    }

    async fn get_seasonal_set(&self, id: SeasonalSetId) -> RepositoryResult<SeasonalSet> {
        self.check_health()?;
        self.data
            .read()
            .seasonal_sets
            .get(&id)
            .cloned()
            .ok_or_else(|| Self::set_not_found(id))
    }

    async fn list_seasonal_sets(&self) -> RepositoryResult<Vec<SeasonalSetInfo>> {
        self.check_health()?;
        Ok(self.data.read().seasonal_sets.values().map(set_info).collect())
    }

    async fn rename_seasonal_set(&self, id: SeasonalSetId, name: &str) -> RepositoryResult<()> {
        self.check_health()?;
        let mut data = self.data.write();
        let set = data
            .seasonal_sets
            .get_mut(&id)
            .ok_or_else(|| Self::set_not_found(id))?;
        set.name = name.to_string();
        Ok(())
    }

    async fn replace_seasonal_rows(
        &self,
        id: SeasonalSetId,
        rows: &[SeasonalRow],
    ) -> RepositoryResult<usize> {
        self.check_health()?;
        let mut data = self.data.write();
        let set = data
            .seasonal_sets
            .get_mut(&id)
            .ok_or_else(|| Self::set_not_found(id))?;
        set.rows = rows.to_vec();
        Ok(rows.len())
    }

    async fn delete_seasonal_set(&self, id: SeasonalSetId) -> RepositoryResult<bool> {
        self.check_health()?;
        Ok(self.data.write().seasonal_sets.remove(&id).is_some())
    }
}

#[async_trait]
impl JournalRepository for LocalRepository {
    async fn append_progress(
        &self,
        parent_id: i64,
        kind: &str,
        entry: &ProgressEntry,
        reset: bool,
    ) -> RepositoryResult<()> {
        self.check_health()?;
        let mut data = self.data.write();
        let log = data
            .progress
            .entry((parent_id, kind.to_string()))
            .or_default();
        if reset {
            log.clear();
        }
        log.push(entry.clone());
        Ok(())
    }

    async fn fetch_progress(
        &self,
        parent_id: i64,
        kind: &str,
    ) -> RepositoryResult<Vec<ProgressEntry>> {
        self.check_health()?;
        Ok(self
            .data
            .read()
            .progress
            .get(&(parent_id, kind.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn record_audit(&self, entry: &AuditEntry) -> RepositoryResult<()> {
        self.check_health()?;
        self.data.write().audit.push(entry.clone());
        Ok(())
    }

    async fn list_audit(&self, limit: usize) -> RepositoryResult<Vec<AuditEntry>> {
        self.check_health()?;
        Ok(self
            .data
            .read()
            .audit
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn store_file(&self, file_name: &str, bytes: &[u8]) -> RepositoryResult<FileId> {
        self.check_health()?;
        let mut data = self.data.write();
        let id = FileId(data.next_file_id);
        data.next_file_id += 1;
        data.files.insert(
            id,
            StoredFile {
                id,
                file_name: file_name.to_string(),
                bytes: bytes.to_vec(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    async fn get_file(&self, id: FileId) -> RepositoryResult<StoredFile> {
        self.check_health()?;
        self.data.read().files.get(&id).cloned().ok_or_else(|| {
            RepositoryError::not_found_with_context(
                format!("File {} not found", id),
                ErrorContext::default().with_entity("file").with_entity_id(id),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fact(day: NaiveDate, source: SourceSystem) -> CanonicalFact {
        CanonicalFact {
            date_rep: day,
            load_from: source,
            st_code: Some("100006".into()),
            st_code_from: None,
            st_code_to: None,
            org_id: Some(1),
            client_sap_id: "10".into(),
            type_op: OperationType::Unloading,
            wagon_num: "1".into(),
            rps_short: "ПВ".into(),
            cargo_group_num: Some(1),
            parking: 1.0,
        }
    }

    #[tokio::test]
    async fn test_replace_facts_scoped_to_source_and_range() {
        let repo = LocalRepository::new();
        let jan = DateRange::new(date(2023, 1, 1), date(2023, 1, 31)).unwrap();
        repo.replace_facts(
            SourceSystem::Cognos,
            None,
            &[fact(date(2023, 1, 5), SourceSystem::Cognos)],
        )
        .await
        .unwrap();
        repo.replace_facts(
            SourceSystem::Sap,
            None,
            &[
                fact(date(2023, 1, 5), SourceSystem::Sap),
                fact(date(2023, 2, 5), SourceSystem::Sap),
            ],
        )
        .await
        .unwrap();

        let outcome = repo
            .replace_facts(
                SourceSystem::Sap,
                Some(jan),
                &[fact(date(2023, 1, 6), SourceSystem::Sap)],
            )
            .await
            .unwrap();

        assert_eq!(outcome, FactReplaceOutcome { deleted: 1, inserted: 1 });
        assert_eq!(repo.fact_count(), 3);
    }

    #[tokio::test]
    async fn test_transition_status_is_compare_and_swap() {
        let repo = LocalRepository::new();
        let calc = repo
            .create_calculation(
                &NewCalcTou::new("calc", date(2023, 1, 1), date(2023, 1, 31), 2023, SeasonalSetId(1)),
                "alice",
                None,
            )
            .await
            .unwrap();

        assert!(repo
            .transition_status(calc.id, CalcStatus::New, CalcStatus::InProcess)
            .await
            .unwrap());
        assert!(!repo
            .transition_status(calc.id, CalcStatus::New, CalcStatus::InProcess)
            .await
            .unwrap());
        assert!(!repo
            .transition_status(CalcId(99), CalcStatus::New, CalcStatus::InProcess)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unhealthy_repository_rejects_calls() {
        let repo = LocalRepository::new();
        repo.set_healthy(false);
        assert!(!repo.health_check().await.unwrap());
        let err = repo.count_facts().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_upsert_sap_clients_inserts_and_renames() {
        let repo = LocalRepository::new();
        repo.replace_client_mapping(&[ClientMapping {
            cognos_id: Some("5".into()),
            sap_id: "100".into(),
            name: "Old".into(),
        }])
        .await
        .unwrap();

        let outcome = repo
            .upsert_sap_clients(&[
                ("100".into(), "New".into()),
                ("200".into(), "Other".into()),
            ])
            .await
            .unwrap();
        assert_eq!(outcome, ClientUpsertOutcome { inserted: 1, updated: 1 });

        let snapshot = repo.reference_snapshot().await.unwrap();
        assert_eq!(snapshot.clients.len(), 2);
        assert_eq!(snapshot.clients[0].name, "New");
        assert_eq!(snapshot.clients[0].cognos_id.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn test_progress_reset_discards_previous_entries() {
        let repo = LocalRepository::new();
        let entry = |msg: &str| ProgressEntry {
            timestamp: Utc::now(),
            level: ProgressLevel::Info,
            username: "bob".into(),
            message: msg.into(),
        };
        repo.append_progress(1, CALC_TOU_LOG_KIND, &entry("a"), false)
            .await
            .unwrap();
        repo.append_progress(1, CALC_TOU_LOG_KIND, &entry("b"), false)
            .await
            .unwrap();
        repo.append_progress(1, CALC_TOU_LOG_KIND, &entry("c"), true)
            .await
            .unwrap();

        let log = repo.fetch_progress(1, CALC_TOU_LOG_KIND).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].message, "c");
    }
}
