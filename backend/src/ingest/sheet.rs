//! Spreadsheet reading and header location (the Read stage).
//!
//! Workbooks (xlsx, xls, xlsb, ods) go through `calamine`; files with a `.csv`
//! extension go through the `csv` crate. Both produce the same grid of typed
//! [`Cell`]s so every later stage is format-agnostic.

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use log::debug;

use super::error::{IngestError, IngestResult};

/// One typed spreadsheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

static EMPTY_CELL: Cell = Cell::Empty;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d.%m.%Y"];

impl Cell {
    /// Text cell with surrounding whitespace stripped; blank text becomes `Empty`.
    pub fn text(value: impl AsRef<str>) -> Cell {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(trimmed.to_string())
        }
    }

    fn from_data(data: &Data) -> Cell {
        match data {
            Data::Empty | Data::Error(_) => Cell::Empty,
            Data::String(s) => Cell::text(s),
            Data::Int(i) => Cell::Int(*i),
            Data::Float(f) => Cell::Float(*f),
            Data::Bool(b) => Cell::Bool(*b),
            Data::DateTime(dt) => excel_serial_to_datetime(dt.as_f64())
                .map(Cell::DateTime)
                .unwrap_or(Cell::Float(dt.as_f64())),
            Data::DateTimeIso(s) => parse_datetime_text(s)
                .map(Cell::DateTime)
                .unwrap_or_else(|| Cell::text(s)),
            other => Cell::text(other.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Display form used in error messages.
    pub fn raw(&self) -> String {
        self.as_string().unwrap_or_default()
    }

    /// String form of any non-empty cell. Whole floats print without a fraction.
    pub fn as_string(&self) -> Option<String> {
        match self {
            Cell::Empty => None,
            Cell::Text(s) => Some(s.clone()),
            Cell::Int(i) => Some(i.to_string()),
            Cell::Float(f) => Some(format_float(*f)),
            Cell::Bool(b) => Some(b.to_string()),
            Cell::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }

    /// Numeric code with any fractional suffix removed (`"1234.0"` → `"1234"`).
    pub fn as_code(&self) -> Option<String> {
        match self {
            Cell::Text(s) => s
                .split('.')
                .next()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            Cell::Float(f) if f.is_finite() => Some((f.trunc() as i64).to_string()),
            Cell::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) => Some(*f),
            Cell::Text(s) => {
                let compact: String = s
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .map(|c| if c == ',' { '.' } else { c })
                    .collect();
                compact.parse().ok()
            }
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::DateTime(dt) => Some(*dt),
            Cell::Text(s) => parse_datetime_text(s),
            Cell::Float(f) => excel_serial_to_datetime(*f),
            Cell::Int(i) => excel_serial_to_datetime(*i as f64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        self.as_datetime().map(|dt| dt.date())
    }
}

fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

/// Convert an Excel serial day number (1900 date system) to a timestamp.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial <= 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    epoch.checked_add_signed(Duration::seconds(seconds))
}

/// Parse ISO (`YYYY-MM-DD[ HH:MM:SS]`) and Russian (`DD.MM.YYYY[ HH:MM[:SS]]`) timestamps.
pub fn parse_datetime_text(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Normalize a header name: newlines become spaces, whitespace runs collapse, ends are trimmed.
pub fn normalize_header(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

const SNIFF_LINES: usize = 20;

/// Read the first worksheet (or the CSV document) into a grid of cells.
pub fn read_grid(bytes: &[u8], file_name: &str) -> IngestResult<Vec<Vec<Cell>>> {
    let grid = if file_name.to_lowercase().ends_with(".csv") {
        read_csv_grid(bytes, file_name)?
    } else {
        read_workbook_grid(bytes, file_name)?
    };
    if grid.iter().all(|row| row.iter().all(Cell::is_empty)) {
        return Err(IngestError::EmptyWorkbook(file_name.to_string()));
    }
    debug!("Read {} rows from '{}'", grid.len(), file_name);
    Ok(grid)
}

fn read_workbook_grid(bytes: &[u8], file_name: &str) -> IngestResult<Vec<Vec<Cell>>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| IngestError::unreadable(file_name, e))?;
    let range = match workbook.worksheet_range_at(0) {
        Some(Ok(range)) => range,
        Some(Err(e)) => return Err(IngestError::unreadable(file_name, e)),
        None => return Err(IngestError::EmptyWorkbook(file_name.to_string())),
    };
    Ok(range
        .rows()
        .map(|row| row.iter().map(Cell::from_data).collect())
        .collect())
}

fn read_csv_grid(bytes: &[u8], file_name: &str) -> IngestResult<Vec<Vec<Cell>>> {
    let bytes = bytes.strip_prefix("\u{feff}".as_bytes()).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(sniff_delimiter(bytes))
        .from_reader(bytes);

    let mut grid = Vec::new();
    for record in reader.byte_records() {
        let record = record.map_err(|e| IngestError::unreadable(file_name, e))?;
        grid.push(
            record
                .iter()
                .map(|field| Cell::text(String::from_utf8_lossy(field)))
                .collect(),
        );
    }
    Ok(grid)
}

/// Semicolon-separated exports are common; pick whichever separator dominates
/// the leading lines (a title line may carry neither).
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let leading: Vec<&[u8]> = bytes.split(|b| *b == b'\n').take(SNIFF_LINES).collect();
    let count = |sep: u8| -> usize {
        leading
            .iter()
            .map(|line| line.iter().filter(|b| **b == sep).count())
            .sum()
    };
    if count(b';') > count(b',') {
        b';'
    } else {
        b','
    }
}

/// A located table: normalized header names plus the data rows below them.
#[derive(Debug, Clone)]
pub struct Table {
    headers: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<(usize, Vec<Cell>)>,
}

/// One data row of a [`Table`].
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    /// 1-based spreadsheet row number
    pub row_number: usize,
    cells: &'a [Cell],
}

impl<'a> Record<'a> {
    pub fn get(&self, column: usize) -> &'a Cell {
        self.cells.get(column).unwrap_or(&EMPTY_CELL)
    }

    /// Cell for an optional column; absent columns read as empty.
    pub fn cell(&self, column: Option<usize>) -> &'a Cell {
        column.map(|c| self.get(c)).unwrap_or(&EMPTY_CELL)
    }
}

impl Table {
    /// Locate the header row and slice the data rows below it.
    ///
    /// The first row is tried first; otherwise the first `search_rows` rows are
    /// scanned for one containing every expected header. `skip_footer` trailing
    /// rows are discarded.
    pub fn locate(
        grid: Vec<Vec<Cell>>,
        expected: &[&str],
        search_rows: usize,
        skip_footer: usize,
    ) -> IngestResult<Table> {
        let expected: Vec<String> = expected.iter().map(|h| normalize_header(h)).collect();
        let window = search_rows.max(1).min(grid.len());

        let mut best_missing: Option<Vec<String>> = None;
        let mut header_row = None;
        for (idx, row) in grid.iter().take(window).enumerate() {
            let names: Vec<String> = row.iter().map(|c| normalize_header(&c.raw())).collect();
            let missing: Vec<String> = expected
                .iter()
                .filter(|h| !names.contains(h))
                .cloned()
                .collect();
            if missing.is_empty() {
                header_row = Some(idx);
                break;
            }
            if best_missing.as_ref().map_or(true, |m| missing.len() < m.len()) {
                best_missing = Some(missing);
            }
        }

        let header_idx = match header_row {
            Some(idx) => idx,
            None => {
                return Err(IngestError::HeaderNotFound {
                    missing: best_missing.unwrap_or(expected),
                })
            }
        };

        let mut rows = grid;
        let mut data = rows.split_off(header_idx + 1);
        let header_cells = rows.pop().unwrap_or_default();

        while data
            .last()
            .is_some_and(|row| row.iter().all(Cell::is_empty))
        {
            data.pop();
        }
        data.truncate(data.len().saturating_sub(skip_footer));

        let headers: Vec<String> = header_cells
            .iter()
            .map(|c| normalize_header(&c.raw()))
            .collect();
        let mut index = HashMap::new();
        for (col, name) in headers.iter().enumerate() {
            if !name.is_empty() {
                index.entry(name.clone()).or_insert(col);
            }
        }

        let first_data_row = header_idx + 2;
        let rows = data
            .into_iter()
            .enumerate()
            .filter(|(_, row)| !row.iter().all(Cell::is_empty))
            .map(|(i, row)| (first_data_row + i, row))
            .collect();

        Ok(Table {
            headers,
            index,
            rows,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.index.get(&normalize_header(name)).copied()
    }

    pub fn require(&self, name: &str) -> IngestResult<usize> {
        self.column(name)
            .ok_or_else(|| IngestError::MissingColumn(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(|(row_number, cells)| Record {
            row_number: *row_number,
            cells,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_row(values: &[&str]) -> Vec<Cell> {
        values.iter().map(Cell::text).collect()
    }

    #[test]
    fn test_normalize_header_collapses_newlines() {
        assert_eq!(
            normalize_header(" Ваг-сут простоя\nдля  сдвоенных "),
            "Ваг-сут простоя для сдвоенных"
        );
    }

    #[test]
    fn test_excel_serial_conversion() {
        let dt = excel_serial_to_datetime(44927.5).unwrap();
        assert_eq!(dt.to_string(), "2023-01-01 12:00:00");
        assert!(excel_serial_to_datetime(-1.0).is_none());
    }

    #[test]
    fn test_text_dates_in_both_notations() {
        let iso = Cell::text("2023-03-05").as_date().unwrap();
        let ru = Cell::text("05.03.2023 14:30").as_datetime().unwrap();
        assert_eq!(iso, NaiveDate::from_ymd_opt(2023, 3, 5).unwrap());
        assert_eq!(ru.date(), iso);
        assert!(Cell::text("not a date").as_datetime().is_none());
    }

    #[test]
    fn test_code_and_number_coercion() {
        assert_eq!(Cell::Float(1234.0).as_code().as_deref(), Some("1234"));
        assert_eq!(Cell::text("98765.0").as_code().as_deref(), Some("98765"));
        assert_eq!(Cell::text("1,5").as_f64(), Some(1.5));
        assert_eq!(Cell::Float(3.0).as_string().as_deref(), Some("3"));
        assert_eq!(Cell::text("   "), Cell::Empty);
    }

    #[test]
    fn test_locate_header_below_title_rows() {
        let grid = vec![
            text_row(&["Report title"]),
            text_row(&[""]),
            text_row(&["A", "B\nC", "D"]),
            text_row(&["1", "2", "3"]),
            text_row(&["4", "5", "6"]),
            text_row(&["Итого", "", ""]),
        ];
        let table = Table::locate(grid, &["A", "B C"], 20, 1).unwrap();
        assert_eq!(table.len(), 2);
        let first = table.records().next().unwrap();
        assert_eq!(first.row_number, 4);
        assert_eq!(first.get(table.require("B C").unwrap()).raw(), "2");
        assert!(first.cell(table.column("missing")).is_empty());
    }

    #[test]
    fn test_locate_reports_missing_headers() {
        let grid = vec![text_row(&["A", "B"]), text_row(&["1", "2"])];
        match Table::locate(grid, &["A", "B", "C"], 20, 0) {
            Err(IngestError::HeaderNotFound { missing }) => assert_eq!(missing, vec!["C"]),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_read_csv_grid_with_semicolons() {
        let bytes = "\u{feff}Род вагона;Тип операции\nПВ;Погрузка\n".as_bytes();
        let grid = read_grid(bytes, "coeffs.CSV").unwrap();
        assert_eq!(grid.len(), 2);
        assert_eq!(grid[0][0], Cell::text("Род вагона"));
        assert_eq!(grid[1][1], Cell::text("Погрузка"));
    }

    #[test]
    fn test_unreadable_workbook() {
        let err = read_grid(b"definitely not a workbook", "upload.xlsx").unwrap_err();
        assert!(matches!(err, IngestError::Unreadable { .. }));
    }
}
