//! Reference Resolver: the Enrich stage.
//!
//! Every lookup against a dictionary is a named join with an explicit
//! [`JoinPolicy`]. Required joins drop rows they cannot resolve; optional joins
//! leave the resolved attribute empty and keep the row.
//!
//! | Join                     | Policy   | Key                                   |
//! |--------------------------|----------|---------------------------------------|
//! | `map_legacy_station`     | optional | 5-digit legacy station code           |
//! | `resolve_route_stations` | optional | origin / destination station name     |
//! | `resolve_rolling_stock`  | required | rolling-stock model name              |
//! | `resolve_client`         | required | Cognos client id                      |
//! | `resolve_cargo`          | optional | lowercase cargo name or ETSNG code    |
//! | `enrich_branch`          | optional | execution station code                |

use std::collections::HashMap;

use log::{debug, warn};
use serde::Serialize;

use super::clean::{CargoRef, CleanedRow};
use crate::api::{OperationType, ReferenceData, SourceSystem};

/// Whether an unresolved lookup drops the row or degrades it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPolicy {
    Required,
    Optional,
}

pub const MAP_LEGACY_STATION: JoinPolicy = JoinPolicy::Optional;
pub const RESOLVE_ROUTE_STATIONS: JoinPolicy = JoinPolicy::Optional;
pub const RESOLVE_ROLLING_STOCK: JoinPolicy = JoinPolicy::Required;
pub const RESOLVE_CLIENT: JoinPolicy = JoinPolicy::Required;
pub const RESOLVE_CARGO: JoinPolicy = JoinPolicy::Optional;
pub const ENRICH_BRANCH: JoinPolicy = JoinPolicy::Optional;

/// Supplementary freight entry for descriptions historically missing from the dictionary.
#[derive(Debug, Clone, Copy)]
pub struct FallbackCargo {
    /// Lowercase cargo description
    pub name: &'static str,
    pub group_num: i32,
    pub etsng_code: &'static str,
}

pub const CARGO_FALLBACK: [FallbackCargo; 5] = [
    FallbackCargo {
        name: "концентрат железорудный (гематит)",
        group_num: 7,
        etsng_code: "141092",
    },
    FallbackCargo {
        name: "кварциты, кроме бакальских, криворожских и кма",
        group_num: 22,
        etsng_code: "301059",
    },
    FallbackCargo {
        name: "средства транспортирования (тележка тт-20 \"бухара\" тяжеловесная и др.), не поименованные в алфавите",
        group_num: 12,
        etsng_code: "391303",
    },
    FallbackCargo {
        name: "вещества радиоактивные",
        group_num: 43,
        etsng_code: "693015",
    },
    FallbackCargo {
        name: "холодильники электробытовые",
        group_num: 12,
        etsng_code: "404217",
    },
];

/// Cargo group of a description from the supplementary table.
pub fn fallback_cargo_group(name: &str) -> Option<i32> {
    let name = name.trim().to_lowercase();
    CARGO_FALLBACK
        .iter()
        .find(|entry| entry.name == name)
        .map(|entry| entry.group_num)
}

/// How a cargo reference was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CargoResolution {
    Dictionary(i32),
    Fallback(i32),
    Unresolved,
}

impl CargoResolution {
    pub fn group_num(&self) -> Option<i32> {
        match self {
            CargoResolution::Dictionary(g) | CargoResolution::Fallback(g) => Some(*g),
            CargoResolution::Unresolved => None,
        }
    }
}

/// Hash indexes over one [`ReferenceData`] snapshot.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    legacy_station: HashMap<String, String>,
    station_names: HashMap<String, String>,
    station_branch: HashMap<String, i64>,
    dictionary_station_pairs: Vec<(String, String)>,
    branch_short_names: HashMap<i64, String>,
    rolling_stock: HashMap<String, String>,
    freight_by_name: HashMap<String, i32>,
    freight_by_code: HashMap<String, i32>,
    cargo_group_names: HashMap<i32, String>,
    client_by_cognos: HashMap<String, String>,
    client_names: HashMap<String, String>,
}

fn first_wins<K: std::hash::Hash + Eq, V>(map: &mut HashMap<K, V>, key: K, value: V) {
    map.entry(key).or_insert(value);
}

impl ReferenceIndex {
    pub fn build(data: &ReferenceData) -> Self {
        let mut index = ReferenceIndex::default();

        for station in &data.stations {
            if let Some(legacy) = &station.legacy_code {
                first_wins(&mut index.legacy_station, legacy.clone(), station.code.clone());
            }
            first_wins(&mut index.station_names, station.code.clone(), station.name.clone());
            if let Some(org_id) = station.org_id {
                first_wins(&mut index.station_branch, station.code.clone(), org_id);
            }
            index
                .dictionary_station_pairs
                .push((station.code.clone(), station.name.clone()));
        }
        for branch in &data.branches {
            first_wins(
                &mut index.branch_short_names,
                branch.org_id,
                branch.short_name.clone(),
            );
        }
        // Full names take precedence over short names on collision.
        for model in &data.rolling_stock {
            first_wins(
                &mut index.rolling_stock,
                model.name.trim().to_lowercase(),
                model.short_name.clone(),
            );
        }
        for model in &data.rolling_stock {
            first_wins(
                &mut index.rolling_stock,
                model.short_name.trim().to_lowercase(),
                model.short_name.clone(),
            );
        }
        for freight in &data.freight {
            first_wins(
                &mut index.freight_by_name,
                freight.name.trim().to_lowercase(),
                freight.group_num,
            );
            first_wins(
                &mut index.freight_by_code,
                freight.etsng_code.clone(),
                freight.group_num,
            );
        }
        for group in &data.cargo_groups {
            first_wins(
                &mut index.cargo_group_names,
                group.group_num,
                group.short_name.clone(),
            );
        }
        for client in &data.clients {
            if let Some(cognos_id) = &client.cognos_id {
                first_wins(
                    &mut index.client_by_cognos,
                    cognos_id.trim().to_string(),
                    client.sap_id.clone(),
                );
            }
            first_wins(&mut index.client_names, client.sap_id.clone(), client.name.clone());
        }

        debug!(
            "Reference index: {} stations, {} rolling-stock keys, {} freight names, {} client mappings",
            index.station_names.len(),
            index.rolling_stock.len(),
            index.freight_by_name.len(),
            index.client_by_cognos.len()
        );
        index
    }

    /// `map_legacy_station`: 5-digit Cognos code to the 6-character canonical code.
    pub fn map_legacy_station(&self, legacy_code: &str) -> Option<String> {
        self.legacy_station.get(legacy_code).cloned()
    }

    /// `resolve_rolling_stock`: model full name or short name to the short code.
    pub fn resolve_rolling_stock(&self, raw: &str) -> Option<&str> {
        self.rolling_stock
            .get(&raw.trim().to_lowercase())
            .map(String::as_str)
    }

    /// `resolve_client`: Cognos client id to SAP client id.
    pub fn resolve_client(&self, cognos_id: &str) -> Option<&str> {
        self.client_by_cognos.get(cognos_id.trim()).map(String::as_str)
    }

    /// `resolve_cargo`: primary dictionary by lowercase name or ETSNG code, then the fallback table.
    pub fn resolve_cargo(&self, source: SourceSystem, cargo: &CargoRef) -> CargoResolution {
        let primary = match source {
            SourceSystem::Cognos => cargo
                .name
                .as_ref()
                .and_then(|name| self.freight_by_name.get(&name.trim().to_lowercase())),
            SourceSystem::Sap => cargo
                .etsng_code
                .as_ref()
                .and_then(|code| self.freight_by_code.get(code)),
        };
        if let Some(group) = primary {
            return CargoResolution::Dictionary(*group);
        }
        cargo
            .name
            .as_deref()
            .and_then(fallback_cargo_group)
            .map(CargoResolution::Fallback)
            .unwrap_or(CargoResolution::Unresolved)
    }

    /// `enrich_branch`: execution station code to its branch.
    pub fn enrich_branch(&self, st_code: &str) -> Option<i64> {
        self.station_branch.get(st_code).copied()
    }

    pub fn station_name(&self, st_code: &str) -> Option<&str> {
        self.station_names.get(st_code).map(String::as_str)
    }

    pub fn branch_short_name(&self, org_id: i64) -> Option<&str> {
        self.branch_short_names.get(&org_id).map(String::as_str)
    }

    pub fn client_name(&self, sap_id: &str) -> Option<&str> {
        self.client_names.get(sap_id).map(String::as_str)
    }

    pub fn cargo_group_name(&self, group_num: i32) -> Option<&str> {
        self.cargo_group_names.get(&group_num).map(String::as_str)
    }

    /// Name → code index for `resolve_route_stations`.
    ///
    /// The file's own (execution code, execution name) pairs come first, deduplicated by
    /// code, followed by the station dictionary; the first occurrence of a name wins.
    pub fn route_station_index(&self, file_pairs: &[(String, String)]) -> RouteStationIndex {
        let mut seen_codes = std::collections::HashSet::new();
        let mut by_name = HashMap::new();
        for (code, name) in file_pairs {
            if seen_codes.insert(code.clone()) {
                first_wins(&mut by_name, name.clone(), code.clone());
            }
        }
        for (code, name) in &self.dictionary_station_pairs {
            first_wins(&mut by_name, name.clone(), code.clone());
        }
        RouteStationIndex { by_name }
    }
}

/// Station-name index used for origin and destination resolution.
#[derive(Debug, Clone, Default)]
pub struct RouteStationIndex {
    by_name: HashMap<String, String>,
}

impl RouteStationIndex {
    pub fn code_for(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }

    /// `resolve_route_stations` for one row.
    ///
    /// Loading takes the execution station as origin, unloading as destination.
    /// Names that resolve nowhere are kept verbatim as the code.
    pub fn resolve(
        &self,
        type_op: OperationType,
        execution_code: Option<&str>,
        origin_name: Option<&str>,
        destination_name: Option<&str>,
    ) -> (Option<String>, Option<String>) {
        let lookup = |name: Option<&str>| name.and_then(|n| self.code_for(n)).map(str::to_string);
        let mut origin = lookup(origin_name);
        let mut destination = lookup(destination_name);

        match type_op {
            OperationType::Loading => origin = execution_code.map(str::to_string),
            OperationType::Unloading => destination = execution_code.map(str::to_string),
        }

        let origin = origin.or_else(|| origin_name.map(str::to_string));
        let destination = destination.or_else(|| destination_name.map(str::to_string));
        (origin, destination)
    }
}

/// A cleaned row after every reference join.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRow {
    pub cleaned: CleanedRow,
    pub st_code: Option<String>,
    pub st_code_from: Option<String>,
    pub st_code_to: Option<String>,
    pub org_id: Option<i64>,
    pub client_sap_id: String,
    pub rps_short: String,
    pub cargo_current: CargoResolution,
    pub cargo_next: CargoResolution,
}

/// Per-join counters collected during enrichment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JoinStats {
    pub dropped_rolling_stock: usize,
    pub dropped_client: usize,
    pub unresolved_station: usize,
    pub unresolved_branch: usize,
    pub cargo_fallback: usize,
    pub unresolved_cargo: usize,
}

/// Run every reference join over the cleaned rows of one import.
pub fn enrich(
    rows: Vec<CleanedRow>,
    source: SourceSystem,
    index: &ReferenceIndex,
) -> (Vec<EnrichedRow>, JoinStats) {
    let mut stats = JoinStats::default();

    // map_legacy_station
    let rows: Vec<(CleanedRow, Option<String>)> = rows
        .into_iter()
        .map(|row| {
            let st_code = match source {
                SourceSystem::Cognos => row
                    .station_code
                    .as_deref()
                    .and_then(|code| index.map_legacy_station(code)),
                SourceSystem::Sap => row.station_code.clone(),
            };
            if st_code.is_none() {
                stats.unresolved_station += 1;
            }
            (row, st_code)
        })
        .collect();

    let file_pairs: Vec<(String, String)> = rows
        .iter()
        .filter_map(|(row, code)| Some((code.clone()?, row.station_name.clone()?)))
        .collect();
    let routes = index.route_station_index(&file_pairs);

    let mut enriched = Vec::with_capacity(rows.len());
    for (row, st_code) in rows {
        let (st_code_from, st_code_to) = routes.resolve(
            row.type_op,
            st_code.as_deref(),
            row.origin_name.as_deref(),
            row.destination_name.as_deref(),
        );

        let Some(rps_short) = index.resolve_rolling_stock(&row.rolling_stock) else {
            stats.dropped_rolling_stock += 1;
            continue;
        };

        let client_sap_id = match source {
            SourceSystem::Cognos => match index.resolve_client(&row.client_id) {
                Some(sap_id) => sap_id.to_string(),
                None => {
                    stats.dropped_client += 1;
                    continue;
                }
            },
            SourceSystem::Sap => row.client_id.clone(),
        };

        let cargo_current = index.resolve_cargo(source, &row.cargo_current);
        let cargo_next = index.resolve_cargo(source, &row.cargo_next);
        let canonical_cargo = match row.type_op {
            OperationType::Unloading => cargo_current,
            OperationType::Loading => cargo_next,
        };
        match canonical_cargo {
            CargoResolution::Fallback(_) => stats.cargo_fallback += 1,
            CargoResolution::Unresolved => stats.unresolved_cargo += 1,
            CargoResolution::Dictionary(_) => {}
        }

        let org_id = st_code.as_deref().and_then(|code| index.enrich_branch(code));
        if org_id.is_none() {
            stats.unresolved_branch += 1;
        }

        enriched.push(EnrichedRow {
            rps_short: rps_short.to_string(),
            cleaned: row,
            st_code,
            st_code_from,
            st_code_to,
            org_id,
            client_sap_id,
            cargo_current,
            cargo_next,
        });
    }

    if stats.dropped_rolling_stock > 0 || stats.dropped_client > 0 {
        warn!(
            "{} import: dropped {} rows with unknown rolling stock and {} rows with unmapped clients",
            source, stats.dropped_rolling_stock, stats.dropped_client
        );
    }
    (enriched, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        ClientMapping, FreightRecord, RollingStockModel, StationRecord,
    };

    fn reference() -> ReferenceData {
        ReferenceData {
            stations: vec![
                StationRecord {
                    code: "100006".into(),
                    legacy_code: Some("10000".into()),
                    name: "Северная".into(),
                    org_id: Some(11),
                },
                StationRecord {
                    code: "200001".into(),
                    legacy_code: Some("20000".into()),
                    name: "Южная".into(),
                    org_id: None,
                },
            ],
            rolling_stock: vec![RollingStockModel {
                name: "Полувагон".into(),
                short_name: "ПВ".into(),
            }],
            freight: vec![FreightRecord {
                etsng_code: "161005".into(),
                name: "Уголь каменный".into(),
                group_num: 1,
            }],
            clients: vec![ClientMapping {
                cognos_id: Some("77".into()),
                sap_id: "9001".into(),
                name: "ООО Ромашка".into(),
            }],
            ..Default::default()
        }
    }

    fn cleaned(type_op: OperationType) -> CleanedRow {
        CleanedRow {
            row_number: 2,
            report_date: chrono::NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            station_code: Some("10000".into()),
            station_name: Some("Северная".into()),
            origin_name: Some("Южная".into()),
            destination_name: Some("Неизвестная".into()),
            client_id: "77".into(),
            client_name: None,
            type_op,
            wagon_num: "1".into(),
            rolling_stock: "полувагон".into(),
            cargo_current: CargoRef {
                name: Some("Уголь каменный".into()),
                etsng_code: None,
            },
            cargo_next: CargoRef {
                name: Some("Вещества радиоактивные".into()),
                etsng_code: None,
            },
            reported_downtime: 1.0,
            is_double: false,
            next_acceptance: None,
            current_arrival: None,
            double_downtime: 0.0,
        }
    }

    #[test]
    fn test_fallback_table_and_unresolved_cargo() {
        let index = ReferenceIndex::build(&reference());
        let fallback = CargoRef {
            name: Some("Концентрат железорудный (гематит)".into()),
            etsng_code: None,
        };
        assert_eq!(
            index.resolve_cargo(SourceSystem::Cognos, &fallback),
            CargoResolution::Fallback(7)
        );
        let unknown = CargoRef {
            name: Some("песок строительный".into()),
            etsng_code: Some("999999".into()),
        };
        assert_eq!(
            index.resolve_cargo(SourceSystem::Sap, &unknown),
            CargoResolution::Unresolved
        );
        let by_code = CargoRef {
            name: None,
            etsng_code: Some("161005".into()),
        };
        assert_eq!(
            index.resolve_cargo(SourceSystem::Sap, &by_code).group_num(),
            Some(1)
        );
    }

    #[test]
    fn test_required_joins_drop_rows() {
        let index = ReferenceIndex::build(&reference());
        let mut unknown_stock = cleaned(OperationType::Loading);
        unknown_stock.rolling_stock = "Цистерна".into();
        let mut unmapped_client = cleaned(OperationType::Loading);
        unmapped_client.client_id = "-1".into();

        let (rows, stats) = enrich(
            vec![cleaned(OperationType::Loading), unknown_stock, unmapped_client],
            SourceSystem::Cognos,
            &index,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(stats.dropped_rolling_stock, 1);
        assert_eq!(stats.dropped_client, 1);
        assert_eq!(rows[0].client_sap_id, "9001");
        assert_eq!(rows[0].rps_short, "ПВ");
    }

    #[test]
    fn test_optional_joins_degrade_rows() {
        let index = ReferenceIndex::build(&reference());
        let mut row = cleaned(OperationType::Unloading);
        row.station_code = Some("99999".into());
        let (rows, stats) = enrich(vec![row], SourceSystem::Cognos, &index);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].st_code, None);
        assert_eq!(rows[0].org_id, None);
        assert_eq!(stats.unresolved_station, 1);
        assert_eq!(stats.unresolved_branch, 1);
    }

    #[test]
    fn test_route_stations_follow_operation_type() {
        let index = ReferenceIndex::build(&reference());
        let (loading, _) = enrich(vec![cleaned(OperationType::Loading)], SourceSystem::Cognos, &index);
        assert_eq!(loading[0].st_code.as_deref(), Some("100006"));
        assert_eq!(loading[0].st_code_from.as_deref(), Some("100006"));
        assert_eq!(loading[0].st_code_to.as_deref(), Some("Неизвестная"));
        assert_eq!(loading[0].org_id, Some(11));

        let (unloading, _) =
            enrich(vec![cleaned(OperationType::Unloading)], SourceSystem::Cognos, &index);
        assert_eq!(unloading[0].st_code_from.as_deref(), Some("200001"));
        assert_eq!(unloading[0].st_code_to.as_deref(), Some("100006"));
    }

    #[test]
    fn test_route_index_prefers_file_pairs() {
        let index = ReferenceIndex::build(&reference());
        let routes =
            index.route_station_index(&[("300003".to_string(), "Южная".to_string())]);
        assert_eq!(routes.code_for("Южная"), Some("300003"));
        assert_eq!(routes.code_for("Северная"), Some("100006"));
    }
}
