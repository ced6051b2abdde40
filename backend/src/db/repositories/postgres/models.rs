use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel::sql_types::Integer;
use std::str::FromStr;

use super::schema::{
    audit_log, calc_tou, facts, progress_log, ref_branches, ref_cargo_groups, ref_client_mapping,
    ref_freight, ref_rolling_stock, ref_stations, seasonal_rows, stored_files,
};
use crate::api::{
    AuditEntry, BranchRecord, CalcId, CalcStatus, CalcTou, CanonicalFact, CargoGroupRecord,
    ClientMapping, FileId, FreightRecord, GroupingMode, NewCalcTou, OperationType, ProgressEntry,
    ProgressLevel, RollingStockModel, SeasonalRow, SeasonalSetId, SourceSystem, StationRecord,
    StoredFile,
};
use crate::db::repository::{RepositoryError, RepositoryResult};

fn parse_column<T: FromStr<Err = String>>(column: &str, raw: &str) -> RepositoryResult<T> {
    raw.parse::<T>().map_err(|e| {
        RepositoryError::validation(format!("Invalid value in column {}: {}", column, e))
    })
}

// ==================== Facts ====================

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = facts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[allow(dead_code)] // fact_id only orders pages
pub struct FactRow {
    pub fact_id: i64,
    pub date_rep: NaiveDate,
    pub load_from: String,
    pub st_code: Option<String>,
    pub st_code_from: Option<String>,
    pub st_code_to: Option<String>,
    pub org_id: Option<i64>,
    pub client_sap_id: String,
    pub type_op: String,
    pub wagon_num: String,
    pub rps_short: String,
    pub cargo_group_num: Option<i32>,
    pub parking: f64,
}

impl FactRow {
    pub fn into_fact(self) -> RepositoryResult<CanonicalFact> {
        Ok(CanonicalFact {
            date_rep: self.date_rep,
            load_from: parse_column::<SourceSystem>("load_from", &self.load_from)?,
            st_code: self.st_code,
            st_code_from: self.st_code_from,
            st_code_to: self.st_code_to,
            org_id: self.org_id,
            client_sap_id: self.client_sap_id,
            type_op: parse_column::<OperationType>("type_op", &self.type_op)?,
            wagon_num: self.wagon_num,
            rps_short: self.rps_short,
            cargo_group_num: self.cargo_group_num,
            parking: self.parking,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = facts)]
pub struct NewFactRow {
    pub date_rep: NaiveDate,
    pub load_from: String,
    pub st_code: Option<String>,
    pub st_code_from: Option<String>,
    pub st_code_to: Option<String>,
    pub org_id: Option<i64>,
    pub client_sap_id: String,
    pub type_op: String,
    pub wagon_num: String,
    pub rps_short: String,
    pub cargo_group_num: Option<i32>,
    pub parking: f64,
}

impl From<&CanonicalFact> for NewFactRow {
    fn from(fact: &CanonicalFact) -> Self {
        Self {
            date_rep: fact.date_rep,
            load_from: fact.load_from.as_str().to_string(),
            st_code: fact.st_code.clone(),
            st_code_from: fact.st_code_from.clone(),
            st_code_to: fact.st_code_to.clone(),
            org_id: fact.org_id,
            client_sap_id: fact.client_sap_id.clone(),
            type_op: fact.type_op.as_str().to_string(),
            wagon_num: fact.wagon_num.clone(),
            rps_short: fact.rps_short.clone(),
            cargo_group_num: fact.cargo_group_num,
            parking: fact.parking,
        }
    }
}

/// Row of the per-month distinct-day aggregation.
#[derive(Debug, Clone, QueryableByName)]
pub struct MonthDayCountRow {
    #[diesel(sql_type = Integer)]
    pub year: i32,
    #[diesel(sql_type = Integer)]
    pub month: i32,
    #[diesel(sql_type = Integer)]
    pub distinct_days: i32,
}

// ==================== Calculations ====================

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = calc_tou)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CalcTouRow {
    pub calc_id: i64,
    pub name: String,
    pub author: String,
    pub status: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub base_year: i32,
    pub group_data: String,
    pub exclude_from: f64,
    pub exclude_to: f64,
    pub exclude_volumes_traffic_less: f64,
    pub amount_year_period: i32,
    pub seasonal_set_id: i64,
    pub branch_id: Option<i64>,
    pub parent_id: Option<i64>,
    pub file_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CalcTouRow {
    pub fn into_calc(self) -> RepositoryResult<CalcTou> {
        Ok(CalcTou {
            id: CalcId(self.calc_id),
            name: self.name,
            author: self.author,
            status: parse_column::<CalcStatus>("status", &self.status)?,
            date_from: self.date_from,
            date_to: self.date_to,
            base_year: self.base_year,
            group_data: parse_column::<GroupingMode>("group_data", &self.group_data)?,
            exclude_from: self.exclude_from,
            exclude_to: self.exclude_to,
            exclude_volumes_traffic_less: self.exclude_volumes_traffic_less,
            amount_year_period: self.amount_year_period.max(0) as u32,
            seasonal_set_id: SeasonalSetId(self.seasonal_set_id),
            branch_id: self.branch_id,
            parent_id: self.parent_id.map(CalcId),
            file_id: self.file_id.map(FileId),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Scalar calculation columns written on create and update.
#[derive(Debug, Clone, Insertable, AsChangeset)]
#[diesel(table_name = calc_tou)]
#[diesel(treat_none_as_null = true)]
pub struct CalcTouFields {
    pub name: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub base_year: i32,
    pub group_data: String,
    pub exclude_from: f64,
    pub exclude_to: f64,
    pub exclude_volumes_traffic_less: f64,
    pub amount_year_period: i32,
    pub seasonal_set_id: i64,
    pub branch_id: Option<i64>,
}

impl From<&NewCalcTou> for CalcTouFields {
    fn from(calc: &NewCalcTou) -> Self {
        Self {
            name: calc.name.clone(),
            date_from: calc.date_from,
            date_to: calc.date_to,
            base_year: calc.base_year,
            group_data: calc.group_data.as_str().to_string(),
            exclude_from: calc.exclude_from,
            exclude_to: calc.exclude_to,
            exclude_volumes_traffic_less: calc.exclude_volumes_traffic_less,
            amount_year_period: calc.amount_year_period as i32,
            seasonal_set_id: calc.seasonal_set_id.value(),
            branch_id: calc.branch_id,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = calc_tou)]
pub struct NewCalcTouRow {
    #[diesel(embed)]
    pub fields: CalcTouFields,
    pub author: String,
    pub status: String,
    pub parent_id: Option<i64>,
}

// ==================== Reference dictionaries ====================

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = ref_stations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StationRow {
    pub code: String,
    pub legacy_code: Option<String>,
    pub name: String,
    pub org_id: Option<i64>,
}

impl From<&StationRecord> for StationRow {
    fn from(r: &StationRecord) -> Self {
        Self {
            code: r.code.clone(),
            legacy_code: r.legacy_code.clone(),
            name: r.name.clone(),
            org_id: r.org_id,
        }
    }
}

impl From<StationRow> for StationRecord {
    fn from(r: StationRow) -> Self {
        Self {
            code: r.code,
            legacy_code: r.legacy_code,
            name: r.name,
            org_id: r.org_id,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = ref_branches)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BranchRow {
    pub org_id: i64,
    pub short_name: String,
    pub name: String,
}

impl From<&BranchRecord> for BranchRow {
    fn from(r: &BranchRecord) -> Self {
        Self {
            org_id: r.org_id,
            short_name: r.short_name.clone(),
            name: r.name.clone(),
        }
    }
}

impl From<BranchRow> for BranchRecord {
    fn from(r: BranchRow) -> Self {
        Self {
            org_id: r.org_id,
            short_name: r.short_name,
            name: r.name,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = ref_rolling_stock)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct RollingStockRow {
    pub name: String,
    pub short_name: String,
}

impl From<&RollingStockModel> for RollingStockRow {
    fn from(r: &RollingStockModel) -> Self {
        Self {
            name: r.name.clone(),
            short_name: r.short_name.clone(),
        }
    }
}

impl From<RollingStockRow> for RollingStockModel {
    fn from(r: RollingStockRow) -> Self {
        Self {
            name: r.name,
            short_name: r.short_name,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = ref_freight)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct FreightRow {
    pub etsng_code: String,
    pub name: String,
    pub group_num: i32,
}

impl From<&FreightRecord> for FreightRow {
    fn from(r: &FreightRecord) -> Self {
        Self {
            etsng_code: r.etsng_code.clone(),
            name: r.name.clone(),
            group_num: r.group_num,
        }
    }
}

impl From<FreightRow> for FreightRecord {
    fn from(r: FreightRow) -> Self {
        Self {
            etsng_code: r.etsng_code,
            name: r.name,
            group_num: r.group_num,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = ref_cargo_groups)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CargoGroupRow {
    pub group_num: i32,
    pub short_name: String,
}

impl From<&CargoGroupRecord> for CargoGroupRow {
    fn from(r: &CargoGroupRecord) -> Self {
        Self {
            group_num: r.group_num,
            short_name: r.short_name.clone(),
        }
    }
}

impl From<CargoGroupRow> for CargoGroupRecord {
    fn from(r: CargoGroupRow) -> Self {
        Self {
            group_num: r.group_num,
            short_name: r.short_name,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = ref_client_mapping)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ClientMappingRow {
    pub sap_id: String,
    pub cognos_id: Option<String>,
    pub name: String,
}

impl From<&ClientMapping> for ClientMappingRow {
    fn from(r: &ClientMapping) -> Self {
        Self {
            sap_id: r.sap_id.clone(),
            cognos_id: r.cognos_id.clone(),
            name: r.name.clone(),
        }
    }
}

impl From<ClientMappingRow> for ClientMapping {
    fn from(r: ClientMappingRow) -> Self {
        Self {
            cognos_id: r.cognos_id,
            sap_id: r.sap_id,
            name: r.name,
        }
    }
}

// ==================== Seasonal coefficients ====================

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = seasonal_rows)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SeasonalRowRecord {
    pub set_id: i64,
    pub rps_short: String,
    pub type_op: String,
    pub coefficients: Vec<f64>,
}

impl SeasonalRowRecord {
    pub fn from_row(set_id: SeasonalSetId, row: &SeasonalRow) -> Self {
        Self {
            set_id: set_id.value(),
            rps_short: row.rps_short.clone(),
            type_op: row.type_op.as_str().to_string(),
            coefficients: row.coefficients.to_vec(),
        }
    }

    pub fn into_row(self) -> RepositoryResult<SeasonalRow> {
        let coefficients: [f64; 12] = self.coefficients.try_into().map_err(|v: Vec<f64>| {
            RepositoryError::validation(format!(
                "Seasonal row {} has {} coefficients, expected 12",
                self.rps_short,
                v.len()
            ))
        })?;
        Ok(SeasonalRow {
            rps_short: self.rps_short,
            type_op: parse_column::<OperationType>("type_op", &self.type_op)?,
            coefficients,
        })
    }
}

// ==================== Journal ====================

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = progress_log)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[allow(dead_code)] // keys are only used in filters
pub struct ProgressRow {
    pub entry_id: i64,
    pub parent_id: i64,
    pub kind: String,
    pub logged_at: DateTime<Utc>,
    pub level: String,
    pub username: String,
    pub message: String,
}

impl ProgressRow {
    pub fn into_entry(self) -> RepositoryResult<ProgressEntry> {
        Ok(ProgressEntry {
            timestamp: self.logged_at,
            level: parse_column::<ProgressLevel>("level", &self.level)?,
            username: self.username,
            message: self.message,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = progress_log)]
pub struct NewProgressRow {
    pub parent_id: i64,
    pub kind: String,
    pub logged_at: DateTime<Utc>,
    pub level: String,
    pub username: String,
    pub message: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = audit_log)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[allow(dead_code)]
pub struct AuditRow {
    pub entry_id: i64,
    pub logged_at: DateTime<Utc>,
    pub username: String,
    pub action: String,
    pub target: String,
    pub succeeded: bool,
    pub detail: Option<String>,
}

impl From<AuditRow> for AuditEntry {
    fn from(r: AuditRow) -> Self {
        Self {
            timestamp: r.logged_at,
            username: r.username,
            action: r.action,
            target: r.target,
            succeeded: r.succeeded,
            detail: r.detail,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = audit_log)]
pub struct NewAuditRow {
    pub logged_at: DateTime<Utc>,
    pub username: String,
    pub action: String,
    pub target: String,
    pub succeeded: bool,
    pub detail: Option<String>,
}

impl From<&AuditEntry> for NewAuditRow {
    fn from(e: &AuditEntry) -> Self {
        Self {
            logged_at: e.timestamp,
            username: e.username.clone(),
            action: e.action.clone(),
            target: e.target.clone(),
            succeeded: e.succeeded,
            detail: e.detail.clone(),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = stored_files)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct StoredFileRow {
    pub file_id: i64,
    pub file_name: String,
    pub content: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl From<StoredFileRow> for StoredFile {
    fn from(r: StoredFileRow) -> Self {
        Self {
            id: FileId(r.file_id),
            file_name: r.file_name,
            bytes: r.content,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = stored_files)]
pub struct NewStoredFileRow {
    pub file_name: String,
    pub content: Vec<u8>,
}
