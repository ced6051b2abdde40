//! Clean stage: coercion of raw cells into typed fields.

use chrono::{NaiveDate, NaiveDateTime};

use super::error::{IngestError, IngestResult};
use super::raw::{ColumnLayout, Field, RawImportRow};
use super::sheet::Cell;
use crate::api::{OperationType, SourceSystem};

/// Client id written for rows whose client column is empty.
pub const MISSING_CLIENT_ID: &str = "-1";

/// Answer marking a combined ("double") operation.
const DOUBLE_OPERATION_ANSWER: &str = "да";

/// Cargo identity as reported by the source (name and, for SAP, ETSNG code).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CargoRef {
    pub name: Option<String>,
    pub etsng_code: Option<String>,
}

/// A raw row after type coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedRow {
    pub row_number: usize,
    pub report_date: NaiveDate,
    /// Cognos: 5-digit legacy code. SAP: 6-digit code.
    pub station_code: Option<String>,
    pub station_name: Option<String>,
    pub origin_name: Option<String>,
    pub destination_name: Option<String>,
    pub client_id: String,
    pub client_name: Option<String>,
    pub type_op: OperationType,
    pub wagon_num: String,
    pub rolling_stock: String,
    pub cargo_current: CargoRef,
    pub cargo_next: CargoRef,
    pub reported_downtime: f64,
    pub is_double: bool,
    pub next_acceptance: Option<NaiveDateTime>,
    pub current_arrival: Option<NaiveDateTime>,
    pub double_downtime: f64,
}

struct RowCleaner<'a> {
    layout: &'a ColumnLayout,
    row: usize,
}

impl RowCleaner<'_> {
    fn column(&self, field: Field) -> &'static str {
        self.layout.header(field).unwrap_or("?")
    }

    fn error(&self, field: Field, cell: &Cell) -> IngestError {
        IngestError::coercion(self.row, self.column(field), cell.raw())
    }

    fn required_text(&self, field: Field, cell: &Cell) -> IngestResult<String> {
        cell.as_string().ok_or_else(|| self.error(field, cell))
    }

    fn optional_f64(&self, field: Field, cell: &Cell) -> IngestResult<Option<f64>> {
        if cell.is_empty() {
            return Ok(None);
        }
        cell.as_f64().map(Some).ok_or_else(|| self.error(field, cell))
    }

    fn optional_datetime(&self, field: Field, cell: &Cell) -> IngestResult<Option<NaiveDateTime>> {
        if cell.is_empty() {
            return Ok(None);
        }
        cell.as_datetime()
            .map(Some)
            .ok_or_else(|| self.error(field, cell))
    }
}

/// Left-pad a numeric code with zeros.
pub fn pad_code(code: &str, width: usize) -> String {
    format!("{:0>width$}", code, width = width)
}

fn padded(cell: &Cell, width: usize) -> Option<String> {
    cell.as_code().map(|code| pad_code(&code, width))
}

fn station_width(source: SourceSystem) -> usize {
    match source {
        SourceSystem::Cognos => 5,
        SourceSystem::Sap => 6,
    }
}

/// Coerce one raw row. Missing date, wagon, operation type or rolling stock is a format error.
pub fn clean_row(raw: &RawImportRow, layout: &ColumnLayout) -> IngestResult<CleanedRow> {
    let c = RowCleaner {
        layout,
        row: raw.row_number,
    };

    let report_date = raw
        .report_date
        .as_date()
        .ok_or_else(|| c.error(Field::ReportDate, &raw.report_date))?;
    let operation = c.required_text(Field::Operation, &raw.operation)?;
    let type_op = operation
        .parse::<OperationType>()
        .map_err(|_| c.error(Field::Operation, &raw.operation))?;
    let wagon_num = raw
        .wagon
        .as_code()
        .ok_or_else(|| c.error(Field::Wagon, &raw.wagon))?;
    let rolling_stock = c.required_text(Field::RollingStock, &raw.rolling_stock)?;

    let client_id = raw
        .client_id
        .as_code()
        .unwrap_or_else(|| MISSING_CLIENT_ID.to_string());

    let is_double = raw
        .double_operation
        .as_string()
        .is_some_and(|v| v.trim().to_lowercase() == DOUBLE_OPERATION_ANSWER);

    Ok(CleanedRow {
        row_number: raw.row_number,
        report_date,
        station_code: padded(&raw.station_code, station_width(layout.source)),
        station_name: raw.station_name.as_string(),
        origin_name: raw.origin_name.as_string(),
        destination_name: raw.destination_name.as_string(),
        client_id,
        client_name: raw.client_name.as_string(),
        type_op,
        wagon_num,
        rolling_stock,
        cargo_current: CargoRef {
            name: raw.cargo_current.as_string(),
            etsng_code: padded(&raw.cargo_current_code, 6),
        },
        cargo_next: CargoRef {
            name: raw.cargo_next.as_string(),
            etsng_code: padded(&raw.cargo_next_code, 6),
        },
        reported_downtime: c
            .optional_f64(Field::ReportedDowntime, &raw.reported_downtime)?
            .unwrap_or(0.0),
        is_double,
        next_acceptance: c.optional_datetime(Field::NextAcceptance, &raw.next_acceptance)?,
        current_arrival: c.optional_datetime(Field::CurrentArrival, &raw.current_arrival)?,
        double_downtime: c
            .optional_f64(Field::DoubleDowntime, &raw.double_downtime)?
            .unwrap_or(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::raw::{COGNOS_LAYOUT, SAP_LAYOUT};

    fn raw_row() -> RawImportRow {
        RawImportRow {
            row_number: 2,
            report_date: Cell::text("2023-01-05"),
            station_code: Cell::Float(1234.0),
            station_name: Cell::text(" Новая "),
            origin_name: Cell::Empty,
            destination_name: Cell::Empty,
            client_id: Cell::Empty,
            client_name: Cell::Empty,
            operation: Cell::text("Выгрузка"),
            wagon: Cell::Float(50012345.0),
            rolling_stock: Cell::text("Полувагон"),
            cargo_current: Cell::text("Уголь"),
            cargo_current_code: Cell::text("16105.0"),
            cargo_next: Cell::Empty,
            cargo_next_code: Cell::Empty,
            reported_downtime: Cell::text("1,5"),
            double_operation: Cell::text(" Да "),
            next_acceptance: Cell::Empty,
            current_arrival: Cell::Empty,
            double_downtime: Cell::Empty,
        }
    }

    #[test]
    fn test_clean_pads_codes_per_source() {
        let cognos = clean_row(&raw_row(), &COGNOS_LAYOUT).unwrap();
        assert_eq!(cognos.station_code.as_deref(), Some("01234"));
        let sap = clean_row(&raw_row(), &SAP_LAYOUT).unwrap();
        assert_eq!(sap.station_code.as_deref(), Some("001234"));
        assert_eq!(sap.cargo_current.etsng_code.as_deref(), Some("016105"));
    }

    #[test]
    fn test_clean_sentinel_client_and_double_flag() {
        let row = clean_row(&raw_row(), &COGNOS_LAYOUT).unwrap();
        assert_eq!(row.client_id, MISSING_CLIENT_ID);
        assert!(row.is_double);
        assert_eq!(row.wagon_num, "50012345");
        assert_eq!(row.station_name.as_deref(), Some("Новая"));
        assert_eq!(row.reported_downtime, 1.5);
        assert_eq!(row.type_op, OperationType::Unloading);
    }

    #[test]
    fn test_clean_rejects_missing_date_and_unknown_operation() {
        let mut raw = raw_row();
        raw.report_date = Cell::Empty;
        let err = clean_row(&raw, &SAP_LAYOUT).unwrap_err();
        assert!(err.to_string().contains("Отчётная дата"));

        let mut raw = raw_row();
        raw.operation = Cell::text("Перестановка");
        assert!(matches!(
            clean_row(&raw, &COGNOS_LAYOUT),
            Err(IngestError::Coercion { row: 2, .. })
        ));
    }

    #[test]
    fn test_pad_code() {
        assert_eq!(pad_code("42", 5), "00042");
        assert_eq!(pad_code("1234567", 6), "1234567");
    }
}
