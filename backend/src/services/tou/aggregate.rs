//! Per-group downtime statistics.

use std::collections::BTreeMap;

use super::records::ReportRecord;
use super::stats::GroupStats;
use crate::api::OperationType;

/// Route part of a group key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouteKey {
    pub st_code_from: Option<String>,
    pub st_code_to: Option<String>,
    pub st_name_from: Option<String>,
    pub st_name_to: Option<String>,
}

/// Aggregation group. Null fields form their own group values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub branch_name: Option<String>,
    pub rps_short: String,
    pub type_op: OperationType,
    pub cargo_group_num: i32,
    pub cargo_group_name: Option<String>,
    pub client_sap_id: String,
    pub client_name: String,
    pub st_code: Option<String>,
    pub st_name: Option<String>,
    pub route: Option<RouteKey>,
}

impl GroupKey {
    pub fn of(record: &ReportRecord) -> Self {
        Self {
            branch_name: record.branch_name.clone(),
            rps_short: record.rps_short.clone(),
            type_op: record.type_op,
            cargo_group_num: record.cargo_group_num,
            cargo_group_name: record.cargo_group_name.clone(),
            client_sap_id: record.client_sap_id.clone(),
            client_name: record.client_name.clone(),
            st_code: record.st_code.clone(),
            st_name: record.st_name.clone(),
            route: record.route.as_ref().map(|r| RouteKey {
                st_code_from: r.st_code_from.clone(),
                st_code_to: r.st_code_to.clone(),
                st_name_from: r.st_name_from.clone(),
                st_name_to: r.st_name_to.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    pub key: GroupKey,
    pub stats: GroupStats,
}

/// Group records and summarize their downtime. Output is ordered by key.
pub fn aggregate(records: &[ReportRecord]) -> Vec<GroupSummary> {
    let mut groups: BTreeMap<GroupKey, Vec<f64>> = BTreeMap::new();
    for record in records {
        groups.entry(GroupKey::of(record)).or_default().push(record.parking);
    }
    groups
        .into_iter()
        .map(|(key, values)| GroupSummary {
            key,
            stats: GroupStats::from_values(values),
        })
        .collect()
}
