//! Report table layout and CSV rendering.

use chrono::NaiveDate;

use super::aggregate::GroupKey;
use super::seasonality::ReportRow;
use crate::api::{CalcTou, GroupingMode};

pub const BASE_COLUMN: &str = "База";

const STATION_GROUP_COLUMNS: [&str; 9] = [
    "Филиал ГО Сокр",
    "РПС Наименование Сокр",
    "Операция тип",
    "Группа груза ГО, номер",
    "Группа груза ГО Наименование Сокр",
    "Клиент ID SAP",
    "Клиент Наименование",
    "Станция выполнения ГО код",
    "Станция выполнения ГО",
];

const ROUTE_GROUP_COLUMNS: [&str; 4] = [
    "Станция отправления код",
    "Станция назначения код",
    "Станция отправления",
    "Станция назначения",
];

const STATS_COLUMNS: [&str; 5] = [
    "Количество вагоноотправок, ед.",
    "Простои Факт Среднее, ваг-сут",
    "Q1",
    "Q2",
    "Мода",
];

const PROJECTION_COLUMNS: [&str; 6] = [
    "Объем < 32",
    "Q2 > срзнач",
    "Конечное значение ТОУ, ваг-сут",
    "Потенциал, %",
    "75% потенциала",
    "Процентная годовая динамика 75%",
];

/// Column layout of one calculation's report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportLayout {
    pub mode: GroupingMode,
    pub base_year: i32,
    pub horizon: u32,
}

impl ReportLayout {
    pub fn of(calc: &CalcTou) -> Self {
        Self {
            mode: calc.group_data,
            base_year: calc.base_year,
            horizon: calc.amount_year_period,
        }
    }

    fn years(&self) -> impl Iterator<Item = i32> {
        let base = self.base_year;
        (0..=self.horizon as i32).map(move |i| base + i)
    }

    pub fn group_columns(&self) -> Vec<&'static str> {
        let mut columns = STATION_GROUP_COLUMNS.to_vec();
        if self.mode.includes_route() {
            columns.extend(ROUTE_GROUP_COLUMNS);
        }
        columns
    }

    /// Width of the table after aggregation.
    pub fn aggregation_width(&self) -> usize {
        self.group_columns().len() + STATS_COLUMNS.len()
    }

    /// Width after the projection columns and one column per year.
    pub fn projection_width(&self) -> usize {
        self.aggregation_width() + PROJECTION_COLUMNS.len() + self.horizon as usize + 1
    }

    /// Width after one column per projected year and month.
    pub fn seasonal_width(&self) -> usize {
        self.projection_width() + 12 * (self.horizon as usize + 1)
    }

    pub fn width(&self) -> usize {
        self.seasonal_width() + 2
    }

    pub fn header(&self) -> Vec<String> {
        let mut header = vec![BASE_COLUMN.to_string(), self.mode.as_str().to_string()];
        header.extend(self.group_columns().into_iter().map(str::to_string));
        header.extend(STATS_COLUMNS.iter().map(|c| c.to_string()));
        header.extend(PROJECTION_COLUMNS.iter().map(|c| c.to_string()));
        header.extend(self.years().map(|y| format!("{}г", y)));
        for year in self.years() {
            header.extend((1..=12).map(|m| format!("{}-{:02}", year, m)));
        }
        header
    }
}

fn escape_key_field(field: &str) -> String {
    field.replace('\\', "\\\\").replace('|', "\\|")
}

/// Composite group key: rolling stock, operation, station identity, client, cargo group.
///
/// The default form separates fields with `|`; `legacy` concatenates them.
/// Missing station codes render as empty strings in both forms, so a legacy
/// key never contains the literal `None` or `nan` placeholders.
pub fn composite_key(key: &GroupKey, legacy: bool) -> String {
    let mut fields: Vec<String> = vec![key.rps_short.clone(), key.type_op.as_str().to_string()];
    match &key.route {
        Some(route) => {
            fields.push(route.st_code_from.clone().unwrap_or_default());
            fields.push(route.st_code_to.clone().unwrap_or_default());
        }
        None => fields.push(key.st_code.clone().unwrap_or_default()),
    }
    fields.push(key.client_sap_id.clone());
    fields.push(key.cargo_group_num.to_string());

    if legacy {
        fields.concat()
    } else {
        fields
            .iter()
            .map(|f| escape_key_field(f))
            .collect::<Vec<_>>()
            .join("|")
    }
}

pub fn base_label(calc: &CalcTou) -> String {
    format!("{}: {}", calc.id, calc.name)
}

pub fn file_name(date_from: NaiveDate, date_to: NaiveDate) -> String {
    format!(
        "report_tou_{}_{}.csv",
        date_from.format("%Y-%m"),
        date_to.format("%Y-%m")
    )
}

fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn row_fields(base: &str, row: &ReportRow, legacy: bool) -> Vec<String> {
    let key = &row.group.key;
    let stats = &row.group.stats;
    let p = &row.projection;

    let mut fields = vec![
        base.to_string(),
        composite_key(key, legacy),
        opt(&key.branch_name),
        key.rps_short.clone(),
        key.type_op.as_str().to_string(),
        key.cargo_group_num.to_string(),
        opt(&key.cargo_group_name),
        key.client_sap_id.clone(),
        key.client_name.clone(),
        opt(&key.st_code),
        opt(&key.st_name),
    ];
    if let Some(route) = &key.route {
        fields.push(opt(&route.st_code_from));
        fields.push(opt(&route.st_code_to));
        fields.push(opt(&route.st_name_from));
        fields.push(opt(&route.st_name_to));
    }
    fields.push(stats.count.to_string());
    for value in [stats.mean, stats.q1, stats.q2, stats.mode] {
        fields.push(value.to_string());
    }
    fields.push(p.small_volume.to_string());
    fields.push(p.median_above_mean.to_string());
    for value in [p.final_value, p.potential, p.potential_target, p.rate] {
        fields.push(value.to_string());
    }
    fields.extend(p.annual.iter().map(f64::to_string));
    for months in &row.monthly {
        fields.extend(months.iter().map(f64::to_string));
    }
    fields
}

/// Render the report as a CSV document with a header row.
pub fn render_csv(calc: &CalcTou, rows: &[ReportRow], legacy: bool) -> Result<Vec<u8>, csv::Error> {
    let layout = ReportLayout::of(calc);
    let base = base_label(calc);
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(layout.header())?;
    for row in rows {
        writer.write_record(row_fields(&base, row, legacy))?;
    }
    writer.into_inner().map_err(|e| e.into_error().into())
}
