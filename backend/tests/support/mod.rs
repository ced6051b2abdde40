#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Mutex;

use chrono::NaiveDate;
use tou_backend::api::{
    BranchRecord, CanonicalFact, CargoGroupRecord, ClientMapping, FreightRecord, GroupingMode,
    NewCalcTou, OperationType, ReferenceData, RollingStockModel, SeasonalRow, SeasonalSetId,
    SourceSystem, StationRecord, DEFAULT_AMOUNT_YEAR_PERIOD, DEFAULT_EXCLUDE_FROM,
    DEFAULT_EXCLUDE_TO, DEFAULT_EXCLUDE_VOLUMES_TRAFFIC_LESS,
};
use tou_backend::db::repositories::LocalRepository;
use tou_backend::db::repository::{FactRepository, ReferenceRepository};

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// Restores the variables on unwind and serializes access to the process
/// environment so parallel tests do not observe each other's changes.
/// `None` removes a variable.
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

pub const STATION: &str = "100006";
pub const LEGACY_STATION: &str = "10000";
pub const BRANCH: i64 = 11;
pub const COGNOS_CLIENT: &str = "77";
pub const SAP_CLIENT: &str = "9001";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// One station, branch, rolling-stock model, freight entry, cargo group and client.
pub fn reference_data() -> ReferenceData {
    ReferenceData {
        stations: vec![StationRecord {
            code: STATION.into(),
            legacy_code: Some(LEGACY_STATION.into()),
            name: "Северная".into(),
            org_id: Some(BRANCH),
        }],
        branches: vec![BranchRecord {
            org_id: BRANCH,
            short_name: "СФ".into(),
            name: "Северный филиал".into(),
        }],
        rolling_stock: vec![RollingStockModel {
            name: "Полувагон".into(),
            short_name: "ПВ".into(),
        }],
        freight: vec![FreightRecord {
            etsng_code: "161005".into(),
            name: "уголь каменный".into(),
            group_num: 1,
        }],
        cargo_groups: vec![
            CargoGroupRecord {
                group_num: 1,
                short_name: "Уголь".into(),
            },
            CargoGroupRecord {
                group_num: 7,
                short_name: "Руда".into(),
            },
        ],
        clients: vec![ClientMapping {
            cognos_id: Some(COGNOS_CLIENT.into()),
            sap_id: SAP_CLIENT.into(),
            name: "ООО Ромашка".into(),
        }],
    }
}

/// A repository holding [`reference_data`].
pub async fn seeded_repository() -> LocalRepository {
    let repo = LocalRepository::new();
    let data = reference_data();
    repo.replace_stations(&data.stations).await.unwrap();
    repo.replace_branches(&data.branches).await.unwrap();
    repo.replace_rolling_stock(&data.rolling_stock).await.unwrap();
    repo.replace_freight(&data.freight).await.unwrap();
    repo.replace_cargo_groups(&data.cargo_groups).await.unwrap();
    repo.replace_client_mapping(&data.clients).await.unwrap();
    repo
}

pub fn fact(day: NaiveDate, wagon: &str, parking: f64) -> CanonicalFact {
    CanonicalFact {
        date_rep: day,
        load_from: SourceSystem::Sap,
        st_code: Some(STATION.into()),
        st_code_from: None,
        st_code_to: Some(STATION.into()),
        org_id: Some(BRANCH),
        client_sap_id: SAP_CLIENT.into(),
        type_op: OperationType::Unloading,
        wagon_num: wagon.into(),
        rps_short: "ПВ".into(),
        cargo_group_num: Some(1),
        parking,
    }
}

/// One SAP fact per day of `from..=to`, downtime cycling through 1..=5 wagon-days.
pub async fn seed_days(repo: &LocalRepository, from: NaiveDate, to: NaiveDate) -> usize {
    let facts: Vec<CanonicalFact> = from
        .iter_days()
        .take_while(|d| *d <= to)
        .enumerate()
        .map(|(i, d)| fact(d, &format!("{}", 60_000 + i), 1.0 + (i % 5) as f64))
        .collect();
    repo.replace_facts(SourceSystem::Sap, None, &facts).await.unwrap();
    facts.len()
}

pub fn seasonal_rows() -> Vec<SeasonalRow> {
    OperationType::ALL
        .iter()
        .map(|op| SeasonalRow {
            rps_short: "ПВ".into(),
            type_op: *op,
            coefficients: [1.0, 1.0, 1.1, 1.0, 1.0, 0.9, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
        })
        .collect()
}

pub fn new_calc(name: &str, from: NaiveDate, to: NaiveDate, set: SeasonalSetId) -> NewCalcTou {
    NewCalcTou {
        name: name.into(),
        date_from: from,
        date_to: to,
        base_year: 2023,
        group_data: GroupingMode::ByStation,
        exclude_from: DEFAULT_EXCLUDE_FROM,
        exclude_to: DEFAULT_EXCLUDE_TO,
        exclude_volumes_traffic_less: DEFAULT_EXCLUDE_VOLUMES_TRAFFIC_LESS,
        amount_year_period: DEFAULT_AMOUNT_YEAR_PERIOD,
        seasonal_set_id: set,
        branch_id: None,
    }
}
