//! Source column layouts and the raw row schema.
//!
//! Each source format maps its (bilingual, inconsistently spelled) column names
//! onto the fields of [`RawImportRow`] through a fixed table. Fields a format
//! does not carry read as empty cells.

use super::error::{IngestError, IngestResult};
use super::sheet::{Cell, Record, Table};
use crate::api::SourceSystem;

/// Field of the raw import schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ReportDate,
    StationCode,
    StationName,
    OriginName,
    DestinationName,
    ClientId,
    ClientName,
    Operation,
    Wagon,
    RollingStock,
    CargoCurrent,
    CargoCurrentCode,
    CargoNext,
    CargoNextCode,
    ReportedDowntime,
    DoubleOperation,
    NextAcceptance,
    CurrentArrival,
    DoubleDowntime,
}

/// Header layout of one source format.
#[derive(Debug, Clone, Copy)]
pub struct ColumnLayout {
    pub source: SourceSystem,
    pub columns: &'static [(Field, &'static str)],
    /// Trailing rows (totals) to discard
    pub skip_footer: usize,
}

pub const COGNOS_LAYOUT: ColumnLayout = ColumnLayout {
    source: SourceSystem::Cognos,
    columns: &[
        (Field::ReportDate, "Отчетная дата"),
        (Field::StationCode, "Код станции ГО"),
        (Field::StationName, "Станция выполнения ГО"),
        (Field::OriginName, "Станция отправления тек."),
        (Field::DestinationName, "Станция назначения след."),
        (Field::ClientId, "Id клиента"),
        (Field::Operation, "Тип операции"),
        (Field::Wagon, "№ вагона"),
        (Field::RollingStock, "Род вагона"),
        (Field::CargoCurrent, "Наименование груза тек."),
        (Field::CargoNext, "Наименование груза след."),
        (Field::ReportedDowntime, "Факт ваг-сут простоя"),
        (Field::DoubleOperation, "Сдвоенная операция"),
        (Field::NextAcceptance, "Дата приема след."),
        (Field::CurrentArrival, "Дата прибытия тек."),
        (Field::DoubleDowntime, "Ваг-сут простоя для сдвоенных"),
    ],
    skip_footer: 0,
};

pub const SAP_LAYOUT: ColumnLayout = ColumnLayout {
    source: SourceSystem::Sap,
    columns: &[
        (Field::ReportDate, "Отчётная дата"),
        (Field::StationCode, "Код станции ГО"),
        (Field::StationName, "Станция выполнения ГО"),
        (Field::OriginName, "Станция отправления тек."),
        (Field::DestinationName, "Станция назначения след."),
        (Field::ClientId, "id клиента SAP"),
        (Field::ClientName, "Наименование клиента"),
        (Field::Operation, "Тип операции"),
        (Field::Wagon, "№ вагона"),
        (Field::RollingStock, "Род вагона"),
        (Field::CargoCurrent, "Наименование груза тек."),
        (Field::CargoCurrentCode, "Код груза ЕТСНГ тек."),
        (Field::CargoNext, "Наименование груза след."),
        (Field::CargoNextCode, "Код груза ЕТСНГ след."),
        (Field::DoubleOperation, "Сдвоенная операция"),
        (Field::ReportedDowntime, "Факт ваг-сут простоя"),
        (Field::DoubleDowntime, "Ваг-сут простоя для сдвоенных"),
    ],
    skip_footer: 1,
};

impl ColumnLayout {
    pub fn for_source(source: SourceSystem) -> &'static ColumnLayout {
        match source {
            SourceSystem::Cognos => &COGNOS_LAYOUT,
            SourceSystem::Sap => &SAP_LAYOUT,
        }
    }

    pub fn headers(&self) -> Vec<&'static str> {
        self.columns.iter().map(|(_, name)| *name).collect()
    }

    /// Header name of a field in this layout.
    pub fn header(&self, field: Field) -> Option<&'static str> {
        self.columns
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, name)| *name)
    }
}

/// One data row as read from the sheet, before any coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct RawImportRow {
    pub row_number: usize,
    pub report_date: Cell,
    pub station_code: Cell,
    pub station_name: Cell,
    pub origin_name: Cell,
    pub destination_name: Cell,
    pub client_id: Cell,
    pub client_name: Cell,
    pub operation: Cell,
    pub wagon: Cell,
    pub rolling_stock: Cell,
    pub cargo_current: Cell,
    pub cargo_current_code: Cell,
    pub cargo_next: Cell,
    pub cargo_next_code: Cell,
    pub reported_downtime: Cell,
    pub double_operation: Cell,
    pub next_acceptance: Cell,
    pub current_arrival: Cell,
    pub double_downtime: Cell,
}

struct ColumnIndex {
    slots: Vec<(Field, usize)>,
}

impl ColumnIndex {
    fn resolve(table: &Table, layout: &ColumnLayout) -> IngestResult<Self> {
        let slots = layout
            .columns
            .iter()
            .map(|(field, name)| table.require(name).map(|col| (*field, col)))
            .collect::<IngestResult<Vec<_>>>()?;
        Ok(Self { slots })
    }

    fn position(&self, field: Field) -> Option<usize> {
        self.slots
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, col)| *col)
    }
}

/// Project every data row of `table` onto the raw schema of `layout`.
pub fn extract_rows(table: &Table, layout: &ColumnLayout) -> IngestResult<Vec<RawImportRow>> {
    if table.is_empty() {
        return Err(IngestError::EmptyImport(layout.source.to_string()));
    }
    let index = ColumnIndex::resolve(table, layout)?;
    let pick = |record: &Record<'_>, field: Field| {
        record.cell(index.position(field)).clone()
    };

    Ok(table
        .records()
        .map(|record| RawImportRow {
            row_number: record.row_number,
            report_date: pick(&record, Field::ReportDate),
            station_code: pick(&record, Field::StationCode),
            station_name: pick(&record, Field::StationName),
            origin_name: pick(&record, Field::OriginName),
            destination_name: pick(&record, Field::DestinationName),
            client_id: pick(&record, Field::ClientId),
            client_name: pick(&record, Field::ClientName),
            operation: pick(&record, Field::Operation),
            wagon: pick(&record, Field::Wagon),
            rolling_stock: pick(&record, Field::RollingStock),
            cargo_current: pick(&record, Field::CargoCurrent),
            cargo_current_code: pick(&record, Field::CargoCurrentCode),
            cargo_next: pick(&record, Field::CargoNext),
            cargo_next_code: pick(&record, Field::CargoNextCode),
            reported_downtime: pick(&record, Field::ReportedDowntime),
            double_operation: pick(&record, Field::DoubleOperation),
            next_acceptance: pick(&record, Field::NextAcceptance),
            current_arrival: pick(&record, Field::CurrentArrival),
            double_downtime: pick(&record, Field::DoubleDowntime),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts_differ_in_date_spelling_and_footer() {
        assert_eq!(COGNOS_LAYOUT.header(Field::ReportDate), Some("Отчетная дата"));
        assert_eq!(SAP_LAYOUT.header(Field::ReportDate), Some("Отчётная дата"));
        assert_eq!(COGNOS_LAYOUT.skip_footer, 0);
        assert_eq!(SAP_LAYOUT.skip_footer, 1);
        assert!(COGNOS_LAYOUT.header(Field::CargoCurrentCode).is_none());
        assert_eq!(ColumnLayout::for_source(SourceSystem::Sap).headers().len(), 17);
    }

    #[test]
    fn test_extract_rows_fills_absent_fields_with_empty() {
        let mut header: Vec<Cell> = COGNOS_LAYOUT.headers().iter().map(Cell::text).collect();
        header.push(Cell::text("Лишний столбец"));
        let mut row = vec![Cell::Empty; header.len()];
        row[0] = Cell::text("2023-01-01");
        let table = Table::locate(vec![header, row], &COGNOS_LAYOUT.headers(), 5, 0).unwrap();

        let rows = extract_rows(&table, &COGNOS_LAYOUT).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].report_date, Cell::text("2023-01-01"));
        assert!(rows[0].client_name.is_empty());
        assert_eq!(rows[0].row_number, 2);
    }
}
