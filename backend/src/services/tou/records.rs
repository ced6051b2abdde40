//! Report records: canonical facts joined with descriptive names.

use chrono::Datelike;

use crate::api::{CanonicalFact, GroupingMode, OperationType};
use crate::ingest::ReferenceIndex;

/// Origin and destination of a record in route grouping mode.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteInfo {
    pub st_code_from: Option<String>,
    pub st_code_to: Option<String>,
    pub st_name_from: Option<String>,
    pub st_name_to: Option<String>,
}

/// A fact ready for traffic-share computation and aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRecord {
    /// (year, month) of the report date
    pub period: (i32, u32),
    /// Branch of the fact itself, the traffic-share denominator
    pub org_id: Option<i64>,
    /// Short name of the execution station's branch
    pub branch_name: Option<String>,
    pub rps_short: String,
    pub type_op: OperationType,
    pub cargo_group_num: i32,
    pub cargo_group_name: Option<String>,
    pub client_sap_id: String,
    pub client_name: String,
    pub st_code: Option<String>,
    pub st_name: Option<String>,
    pub route: Option<RouteInfo>,
    pub wagon_num: String,
    pub parking: f64,
    /// Share of the (period, rolling stock, operation, branch) volume; set by the traffic stage
    pub share: f64,
}

fn station_name(index: &ReferenceIndex, code: Option<&str>) -> Option<String> {
    code.and_then(|c| index.station_name(c)).map(str::to_string)
}

/// Attach station, branch, client and cargo-group names to each fact.
///
/// Every join here is optional. A client without a mapped name falls back to
/// its SAP id; a null cargo group becomes group 0.
pub fn enrich_facts(
    facts: Vec<CanonicalFact>,
    index: &ReferenceIndex,
    mode: GroupingMode,
) -> Vec<ReportRecord> {
    facts
        .into_iter()
        .map(|fact| {
            let st_name = station_name(index, fact.st_code.as_deref());
            let branch_name = fact
                .st_code
                .as_deref()
                .and_then(|code| index.enrich_branch(code))
                .and_then(|org| index.branch_short_name(org))
                .map(str::to_string);
            let client_name = index
                .client_name(&fact.client_sap_id)
                .map(str::to_string)
                .unwrap_or_else(|| fact.client_sap_id.clone());
            let cargo_group_num = fact.cargo_group_num.unwrap_or(0);
            let cargo_group_name = index.cargo_group_name(cargo_group_num).map(str::to_string);
            let route = mode.includes_route().then(|| RouteInfo {
                st_name_from: station_name(index, fact.st_code_from.as_deref()),
                st_name_to: station_name(index, fact.st_code_to.as_deref()),
                st_code_from: fact.st_code_from.clone(),
                st_code_to: fact.st_code_to.clone(),
            });

            ReportRecord {
                period: (fact.date_rep.year(), fact.date_rep.month()),
                org_id: fact.org_id,
                branch_name,
                rps_short: fact.rps_short,
                type_op: fact.type_op,
                cargo_group_num,
                cargo_group_name,
                client_sap_id: fact.client_sap_id,
                client_name,
                st_code: fact.st_code,
                st_name,
                route,
                wagon_num: fact.wagon_num,
                parking: fact.parking,
                share: 0.0,
            }
        })
        .collect()
}
