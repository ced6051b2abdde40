//! Derive stage: downtime allocation for Cognos rows.

use chrono::NaiveDateTime;

use super::clean::CleanedRow;
use crate::api::SourceSystem;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Round to 6 decimal places.
pub fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

fn day_gap(from: Option<NaiveDateTime>, to: Option<NaiveDateTime>) -> Option<f64> {
    match (from, to) {
        (Some(from), Some(to)) => Some((to - from).num_seconds() as f64 / SECONDS_PER_DAY),
        _ => None,
    }
}

/// Downtime in wagon-days for one Cognos row.
///
/// Single operations take the gap between arrival and next acceptance. Combined
/// operations with a positive combined downtime get the gap allocated in
/// proportion to their own reported downtime. Everything else keeps the
/// reported value.
pub fn allocate_downtime(row: &CleanedRow) -> f64 {
    let gap = day_gap(row.current_arrival, row.next_acceptance);
    let value = match (row.is_double, gap) {
        (false, Some(gap)) => gap,
        (true, Some(gap)) if row.double_downtime > 0.0 => {
            gap / row.double_downtime * row.reported_downtime
        }
        _ => row.reported_downtime,
    };
    round6(value)
}

/// Final downtime of a row: derived for Cognos, reported as-is for SAP.
pub fn downtime_for(source: SourceSystem, row: &CleanedRow) -> f64 {
    match source {
        SourceSystem::Cognos => allocate_downtime(row),
        SourceSystem::Sap => row.reported_downtime,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::OperationType;
    use crate::ingest::clean::CargoRef;
    use chrono::NaiveDate;

    fn at(day: u32) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(2023, 1, day).and_then(|d| d.and_hms_opt(0, 0, 0))
    }

    fn row(is_double: bool, reported: f64, combined: f64) -> CleanedRow {
        CleanedRow {
            row_number: 2,
            report_date: NaiveDate::from_ymd_opt(2023, 1, 3).unwrap(),
            station_code: None,
            station_name: None,
            origin_name: None,
            destination_name: None,
            client_id: "1".into(),
            client_name: None,
            type_op: OperationType::Loading,
            wagon_num: "1".into(),
            rolling_stock: "ПВ".into(),
            cargo_current: CargoRef::default(),
            cargo_next: CargoRef::default(),
            reported_downtime: reported,
            is_double,
            next_acceptance: at(3),
            current_arrival: at(1),
            double_downtime: combined,
        }
    }

    #[test]
    fn test_single_operation_uses_day_gap() {
        assert_eq!(allocate_downtime(&row(false, 9.0, 0.0)), 2.0);
    }

    #[test]
    fn test_double_operation_allocates_proportionally() {
        let mut r = row(true, 1.5, 4.0);
        r.next_acceptance = at(4);
        assert!((allocate_downtime(&r) - 1.125).abs() < 1e-9);
    }

    #[test]
    fn test_double_without_combined_keeps_reported() {
        assert_eq!(allocate_downtime(&row(true, 1.5, 0.0)), 1.5);
    }

    #[test]
    fn test_missing_dates_fall_back_to_reported() {
        let mut r = row(false, 0.75, 0.0);
        r.next_acceptance = None;
        assert_eq!(allocate_downtime(&r), 0.75);
    }

    #[test]
    fn test_sap_rows_are_not_derived() {
        assert_eq!(downtime_for(SourceSystem::Sap, &row(false, 9.0, 0.0)), 9.0);
    }

    #[test]
    fn test_round6() {
        assert_eq!(round6(1.0 / 3.0), 0.333333);
        assert_eq!(round6(2.0000004), 2.0);
    }
}
