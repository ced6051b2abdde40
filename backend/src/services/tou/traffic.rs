//! Traffic share and exclusion filter.
//!
//! A record's share is the size of its flow (period, rolling stock, operation,
//! cargo group, station, branch, client and in route mode origin and
//! destination) relative to the size of its branch volume (period, rolling
//! stock, operation, branch).

use std::collections::HashMap;

use super::records::ReportRecord;
use crate::api::{CalcTou, OperationType};

#[derive(Debug, PartialEq, Eq, Hash)]
struct FlowKey<'a> {
    period: (i32, u32),
    rps: &'a str,
    type_op: OperationType,
    cargo: i32,
    st_code: Option<&'a str>,
    org_id: Option<i64>,
    client: &'a str,
    from: Option<&'a str>,
    to: Option<&'a str>,
}

impl<'a> FlowKey<'a> {
    fn of(record: &'a ReportRecord) -> Self {
        let route = record.route.as_ref();
        Self {
            period: record.period,
            rps: &record.rps_short,
            type_op: record.type_op,
            cargo: record.cargo_group_num,
            st_code: record.st_code.as_deref(),
            org_id: record.org_id,
            client: &record.client_sap_id,
            from: route.and_then(|r| r.st_code_from.as_deref()),
            to: route.and_then(|r| r.st_code_to.as_deref()),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
struct BranchKey<'a> {
    period: (i32, u32),
    rps: &'a str,
    type_op: OperationType,
    org_id: Option<i64>,
}

impl<'a> BranchKey<'a> {
    fn of(record: &'a ReportRecord) -> Self {
        Self {
            period: record.period,
            rps: &record.rps_short,
            type_op: record.type_op,
            org_id: record.org_id,
        }
    }
}

/// Set `share` on every record.
pub fn assign_traffic_share(records: &mut [ReportRecord]) {
    let shares: Vec<f64> = {
        let mut flows: HashMap<FlowKey<'_>, usize> = HashMap::new();
        let mut branches: HashMap<BranchKey<'_>, usize> = HashMap::new();
        for record in records.iter() {
            *flows.entry(FlowKey::of(record)).or_default() += 1;
            *branches.entry(BranchKey::of(record)).or_default() += 1;
        }
        records
            .iter()
            .map(|record| {
                let flow = flows.get(&FlowKey::of(record)).copied().unwrap_or(0);
                let branch = branches.get(&BranchKey::of(record)).copied().unwrap_or(1);
                flow as f64 / branch.max(1) as f64
            })
            .collect()
    };
    for (record, share) in records.iter_mut().zip(shares) {
        record.share = share;
    }
}

/// Exclusion thresholds of a calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Downtime must be strictly above this
    pub lower: f64,
    /// Downtime must be strictly below this
    pub upper: f64,
    /// Traffic share must be strictly above this
    pub min_share: f64,
}

impl Thresholds {
    pub fn of(calc: &CalcTou) -> Self {
        Self {
            lower: calc.exclude_to,
            upper: calc.exclude_from,
            min_share: calc.exclude_volumes_traffic_less,
        }
    }

    pub fn keeps(&self, record: &ReportRecord) -> bool {
        record.parking > self.lower && record.parking < self.upper && record.share > self.min_share
    }
}

/// Keep the records inside the downtime window with a large enough share.
pub fn apply_exclusions(records: Vec<ReportRecord>, thresholds: &Thresholds) -> Vec<ReportRecord> {
    records.into_iter().filter(|r| thresholds.keeps(r)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(client: &str, org_id: i64, parking: f64) -> ReportRecord {
        ReportRecord {
            period: (2023, 1),
            org_id: Some(org_id),
            branch_name: None,
            rps_short: "ПВ".into(),
            type_op: OperationType::Unloading,
            cargo_group_num: 1,
            cargo_group_name: None,
            client_sap_id: client.into(),
            client_name: client.into(),
            st_code: Some("100005".into()),
            st_name: None,
            route: None,
            wagon_num: "1".into(),
            parking,
            share: 0.0,
        }
    }

    #[test]
    fn test_share_is_flow_over_branch_volume() {
        let mut records = vec![
            record("a", 1, 1.0),
            record("a", 1, 2.0),
            record("a", 1, 3.0),
            record("b", 1, 1.0),
            record("b", 2, 1.0),
        ];
        assign_traffic_share(&mut records);
        assert_eq!(records[0].share, 0.75);
        assert_eq!(records[3].share, 0.25);
        assert_eq!(records[4].share, 1.0);
    }

    #[test]
    fn test_exclusion_bounds_are_strict() {
        let thresholds = Thresholds {
            lower: 0.4,
            upper: 30.0,
            min_share: 0.3,
        };
        let mut records = vec![
            record("a", 1, 0.4),
            record("a", 1, 30.0),
            record("a", 1, 5.0),
            record("b", 1, 5.0),
        ];
        assign_traffic_share(&mut records);
        let kept = apply_exclusions(records, &thresholds);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].parking, 5.0);
        assert_eq!(kept[0].client_sap_id, "a");
    }
}
