//! Monthly targets from annual values and seasonal coefficients.

use super::aggregate::GroupSummary;
use super::projection::Projection;
use crate::api::SeasonalSet;

/// A group with its projection and month-level targets.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub group: GroupSummary,
    pub projection: Projection,
    /// One row of 12 monthly targets per projected year
    pub monthly: Vec<[f64; 12]>,
}

pub fn monthly_targets(annual: &[f64], coefficients: &[f64; 12]) -> Vec<[f64; 12]> {
    annual
        .iter()
        .map(|value| {
            let mut months = [0.0; 12];
            for (month, coefficient) in months.iter_mut().zip(coefficients) {
                *month = value * coefficient;
            }
            months
        })
        .collect()
}

/// Inner join on (rolling stock, operation): groups without a coefficient row
/// are dropped. Returns the joined rows and the number of dropped groups.
pub fn apply_seasonality(
    projected: Vec<(GroupSummary, Projection)>,
    set: &SeasonalSet,
) -> (Vec<ReportRow>, usize) {
    let mut dropped = 0;
    let rows = projected
        .into_iter()
        .filter_map(|(group, projection)| {
            match set.find(&group.key.rps_short, group.key.type_op) {
                Some(row) => Some(ReportRow {
                    monthly: monthly_targets(&projection.annual, &row.coefficients),
                    group,
                    projection,
                }),
                None => {
                    dropped += 1;
                    None
                }
            }
        })
        .collect();
    (rows, dropped)
}
