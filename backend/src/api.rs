//! Public API surface for the TOU backend.
//!
//! Domain types used across the ingestion pipeline, the repositories, the
//! calculation engine and the HTTP layer. All types derive Serialize/Deserialize
//! for JSON serialization.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

define_id_type!(
    /// Calculation identifier (database primary key).
    i64,
    CalcId
);
define_id_type!(
    /// Seasonal coefficient set identifier.
    i64,
    SeasonalSetId
);
define_id_type!(
    /// Stored file identifier (report artifacts).
    i64,
    FileId
);

// =============================================================================
// Enumerations
// =============================================================================

/// Upstream system a fact was imported from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceSystem {
    #[serde(rename = "Cognos")]
    Cognos,
    #[serde(rename = "SAP")]
    Sap,
}

impl SourceSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceSystem::Cognos => "Cognos",
            SourceSystem::Sap => "SAP",
        }
    }
}

impl fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cognos" => Ok(Self::Cognos),
            "sap" => Ok(Self::Sap),
            _ => Err(format!("Unknown source system: {}", s)),
        }
    }
}

/// Wagon operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationType {
    /// Погрузка
    #[serde(rename = "Погрузка")]
    Loading,
    /// Выгрузка
    #[serde(rename = "Выгрузка")]
    Unloading,
}

impl OperationType {
    pub const ALL: [OperationType; 2] = [OperationType::Loading, OperationType::Unloading];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Loading => "Погрузка",
            OperationType::Unloading => "Выгрузка",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "погрузка" => Ok(Self::Loading),
            "выгрузка" => Ok(Self::Unloading),
            _ => Err(format!("Unknown operation type: {}", s.trim())),
        }
    }
}

/// Calculation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalcStatus {
    New,
    InProcess,
    Done,
    /// The background run raised an error; `reset` returns the calculation to NEW.
    Failed,
    Deleted,
}

impl CalcStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalcStatus::New => "NEW",
            CalcStatus::InProcess => "IN_PROCESS",
            CalcStatus::Done => "DONE",
            CalcStatus::Failed => "FAILED",
            CalcStatus::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for CalcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalcStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NEW" => Ok(Self::New),
            "IN_PROCESS" => Ok(Self::InProcess),
            "DONE" => Ok(Self::Done),
            "FAILED" => Ok(Self::Failed),
            "DELETED" => Ok(Self::Deleted),
            _ => Err(format!("Unknown calculation status: {}", s)),
        }
    }
}

/// How facts are grouped by the calculation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GroupingMode {
    /// Execution station only ("РОСКГ").
    #[default]
    #[serde(rename = "РОСКГ")]
    ByStation,
    /// Origin + destination + execution station ("РОС1С2КГ").
    #[serde(rename = "РОС1С2КГ")]
    ByRoute,
}

impl GroupingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupingMode::ByStation => "РОСКГ",
            GroupingMode::ByRoute => "РОС1С2КГ",
        }
    }

    pub fn includes_route(&self) -> bool {
        matches!(self, GroupingMode::ByRoute)
    }
}

impl fmt::Display for GroupingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "РОСКГ" => Ok(Self::ByStation),
            "РОС1С2КГ" => Ok(Self::ByRoute),
            other => Err(format!("Unknown grouping mode: {}", other)),
        }
    }
}

// =============================================================================
// Periods
// =============================================================================

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, String> {
        if from > to {
            return Err(format!("Date range start {} is after its end {}", from, to));
        }
        Ok(Self { from, to })
    }

    /// Number of calendar days in the range, both ends included.
    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.from, self.to)
    }
}

/// Number of days in a calendar month, accounting for leap years.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    match (
        NaiveDate::from_ymd_opt(year, month, 1),
        NaiveDate::from_ymd_opt(next_year, next_month, 1),
    ) {
        (Some(first), Some(next)) => (next - first).num_days() as u32,
        _ => 0,
    }
}

// =============================================================================
// Facts and coverage
// =============================================================================

/// One canonical wagon operation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalFact {
    pub date_rep: NaiveDate,
    pub load_from: SourceSystem,
    /// Execution station (6-character code)
    pub st_code: Option<String>,
    pub st_code_from: Option<String>,
    pub st_code_to: Option<String>,
    /// Branch (organization) identifier
    pub org_id: Option<i64>,
    pub client_sap_id: String,
    pub type_op: OperationType,
    pub wagon_num: String,
    pub rps_short: String,
    pub cargo_group_num: Option<i32>,
    /// Downtime in wagon-days
    pub parking: f64,
}

impl CanonicalFact {
    /// Composite natural key used for pre-insert deduplication.
    pub fn natural_key(&self) -> FactKey {
        FactKey {
            date_rep: self.date_rep,
            st_code: self.st_code.clone(),
            st_code_from: self.st_code_from.clone(),
            st_code_to: self.st_code_to.clone(),
            org_id: self.org_id,
            client_sap_id: self.client_sap_id.clone(),
            type_op: self.type_op,
            wagon_num: self.wagon_num.clone(),
            cargo_group_num: self.cargo_group_num,
        }
    }
}

/// Deduplication key of a fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FactKey {
    pub date_rep: NaiveDate,
    pub st_code: Option<String>,
    pub st_code_from: Option<String>,
    pub st_code_to: Option<String>,
    pub org_id: Option<i64>,
    pub client_sap_id: String,
    pub type_op: OperationType,
    pub wagon_num: String,
    pub cargo_group_num: Option<i32>,
}

/// Predicate set used to read facts for a calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactQuery {
    pub range: DateRange,
    pub org_id: Option<i64>,
    #[serde(default)]
    pub operation_types: Vec<OperationType>,
    #[serde(default)]
    pub rps: Vec<String>,
    #[serde(default)]
    pub stations: Vec<String>,
}

impl FactQuery {
    pub fn for_range(range: DateRange) -> Self {
        Self {
            range,
            org_id: None,
            operation_types: Vec::new(),
            rps: Vec::new(),
            stations: Vec::new(),
        }
    }

    pub fn matches(&self, fact: &CanonicalFact) -> bool {
        if !self.range.contains(fact.date_rep) {
            return false;
        }
        if let Some(org_id) = self.org_id {
            if fact.org_id != Some(org_id) {
                return false;
            }
        }
        if !self.operation_types.is_empty() && !self.operation_types.contains(&fact.type_op) {
            return false;
        }
        if !self.rps.is_empty() && !self.rps.iter().any(|r| r == &fact.rps_short) {
            return false;
        }
        if !self.stations.is_empty() {
            match &fact.st_code {
                Some(code) if self.stations.iter().any(|s| s == code) => {}
                _ => return false,
            }
        }
        true
    }
}

/// A (year, month) period with a fact for every calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CoverageEntry {
    pub year: i32,
    pub month: u32,
}

impl CoverageEntry {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

/// Distinct report-date count for one (year, month).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthDayCount {
    pub year: i32,
    pub month: u32,
    pub distinct_days: u32,
}

/// Result of a period-scoped fact replacement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactReplaceOutcome {
    pub deleted: usize,
    pub inserted: usize,
}

// =============================================================================
// Calculations
// =============================================================================

/// Stored calculation (CalcTOU) record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalcTou {
    pub id: CalcId,
    pub name: String,
    pub author: String,
    pub status: CalcStatus,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub base_year: i32,
    pub group_data: GroupingMode,
    /// Upper downtime bound (records must be strictly below it)
    pub exclude_from: f64,
    /// Lower downtime bound (records must be strictly above it)
    pub exclude_to: f64,
    pub exclude_volumes_traffic_less: f64,
    pub amount_year_period: u32,
    pub seasonal_set_id: SeasonalSetId,
    pub branch_id: Option<i64>,
    pub parent_id: Option<CalcId>,
    pub file_id: Option<FileId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CalcTou {
    pub fn date_range(&self) -> Result<DateRange, String> {
        DateRange::new(self.date_from, self.date_to)
    }
}

/// Many-to-many filter sets attached to a calculation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalcFilters {
    #[serde(default)]
    pub rps: Vec<String>,
    #[serde(default)]
    pub operation_types: Vec<OperationType>,
    #[serde(default)]
    pub stations: Vec<String>,
}

/// A calculation together with its resolved filter sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalcTouSpec {
    pub calc: CalcTou,
    pub filters: CalcFilters,
}

impl CalcTouSpec {
    pub fn fact_query(&self) -> Result<FactQuery, String> {
        Ok(FactQuery {
            range: self.calc.date_range()?,
            org_id: self.calc.branch_id,
            operation_types: self.filters.operation_types.clone(),
            rps: self.filters.rps.clone(),
            stations: self.filters.stations.clone(),
        })
    }
}

pub const DEFAULT_EXCLUDE_FROM: f64 = 30.0;
pub const DEFAULT_EXCLUDE_TO: f64 = 0.4;
pub const DEFAULT_EXCLUDE_VOLUMES_TRAFFIC_LESS: f64 = 0.001;
pub const DEFAULT_AMOUNT_YEAR_PERIOD: u32 = 5;

/// Scalar fields of a calculation to be created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCalcTou {
    pub name: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub base_year: i32,
    #[serde(default)]
    pub group_data: GroupingMode,
    #[serde(default = "default_exclude_from")]
    pub exclude_from: f64,
    #[serde(default = "default_exclude_to")]
    pub exclude_to: f64,
    #[serde(default = "default_exclude_volumes_traffic_less")]
    pub exclude_volumes_traffic_less: f64,
    #[serde(default = "default_amount_year_period")]
    pub amount_year_period: u32,
    pub seasonal_set_id: SeasonalSetId,
    #[serde(default)]
    pub branch_id: Option<i64>,
}

fn default_exclude_from() -> f64 {
    DEFAULT_EXCLUDE_FROM
}

fn default_exclude_to() -> f64 {
    DEFAULT_EXCLUDE_TO
}

fn default_exclude_volumes_traffic_less() -> f64 {
    DEFAULT_EXCLUDE_VOLUMES_TRAFFIC_LESS
}

fn default_amount_year_period() -> u32 {
    DEFAULT_AMOUNT_YEAR_PERIOD
}

impl NewCalcTou {
    /// Calculation with default thresholds and horizon.
    pub fn new(
        name: impl Into<String>,
        date_from: NaiveDate,
        date_to: NaiveDate,
        base_year: i32,
        seasonal_set_id: SeasonalSetId,
    ) -> Self {
        Self {
            name: name.into(),
            date_from,
            date_to,
            base_year,
            group_data: GroupingMode::default(),
            exclude_from: DEFAULT_EXCLUDE_FROM,
            exclude_to: DEFAULT_EXCLUDE_TO,
            exclude_volumes_traffic_less: DEFAULT_EXCLUDE_VOLUMES_TRAFFIC_LESS,
            amount_year_period: DEFAULT_AMOUNT_YEAR_PERIOD,
            seasonal_set_id,
            branch_id: None,
        }
    }

    pub fn from_existing(calc: &CalcTou) -> Self {
        Self {
            name: calc.name.clone(),
            date_from: calc.date_from,
            date_to: calc.date_to,
            base_year: calc.base_year,
            group_data: calc.group_data,
            exclude_from: calc.exclude_from,
            exclude_to: calc.exclude_to,
            exclude_volumes_traffic_less: calc.exclude_volumes_traffic_less,
            amount_year_period: calc.amount_year_period,
            seasonal_set_id: calc.seasonal_set_id,
            branch_id: calc.branch_id,
        }
    }
}

/// Partial update of a calculation. Filter sets, when present, replace the stored set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalcTouPatch {
    pub name: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub base_year: Option<i32>,
    pub group_data: Option<GroupingMode>,
    pub exclude_from: Option<f64>,
    pub exclude_to: Option<f64>,
    pub exclude_volumes_traffic_less: Option<f64>,
    pub amount_year_period: Option<u32>,
    pub seasonal_set_id: Option<SeasonalSetId>,
    /// `Some(None)` clears the branch filter.
    #[serde(default, with = "double_option")]
    pub branch_id: Option<Option<i64>>,
    pub rps: Option<Vec<String>>,
    pub operation_types: Option<Vec<OperationType>>,
    pub stations: Option<Vec<String>>,
}

impl CalcTouPatch {
    /// Overwrite the scalar fields present in the patch.
    pub fn apply_to(&self, calc: &mut NewCalcTou) {
        if let Some(name) = &self.name {
            calc.name = name.clone();
        }
        if let Some(v) = self.date_from {
            calc.date_from = v;
        }
        if let Some(v) = self.date_to {
            calc.date_to = v;
        }
        if let Some(v) = self.base_year {
            calc.base_year = v;
        }
        if let Some(v) = self.group_data {
            calc.group_data = v;
        }
        if let Some(v) = self.exclude_from {
            calc.exclude_from = v;
        }
        if let Some(v) = self.exclude_to {
            calc.exclude_to = v;
        }
        if let Some(v) = self.exclude_volumes_traffic_less {
            calc.exclude_volumes_traffic_less = v;
        }
        if let Some(v) = self.amount_year_period {
            calc.amount_year_period = v;
        }
        if let Some(v) = self.seasonal_set_id {
            calc.seasonal_set_id = v;
        }
        if let Some(v) = self.branch_id {
            calc.branch_id = v;
        }
    }
}

mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<Option<i64>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<i64>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<i64>::deserialize(deserializer).map(Some)
    }
}

// =============================================================================
// Seasonal coefficients
// =============================================================================

/// Monthly multipliers for one (rolling stock, operation type) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalRow {
    pub rps_short: String,
    pub type_op: OperationType,
    /// January..December
    pub coefficients: [f64; 12],
}

/// Named set of seasonal coefficient rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalSet {
    pub id: SeasonalSetId,
    pub name: String,
    pub rows: Vec<SeasonalRow>,
}

impl SeasonalSet {
    pub fn find(&self, rps_short: &str, type_op: OperationType) -> Option<&SeasonalRow> {
        self.rows
            .iter()
            .find(|r| r.rps_short == rps_short && r.type_op == type_op)
    }
}

/// Lightweight listing entry for seasonal sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalSetInfo {
    pub id: SeasonalSetId,
    pub name: String,
    pub row_count: usize,
}

// =============================================================================
// Reference dictionaries
// =============================================================================

/// Station descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    /// Canonical 6-character code
    pub code: String,
    /// Legacy 5-digit code used by Cognos exports
    pub legacy_code: Option<String>,
    pub name: String,
    pub org_id: Option<i64>,
}

/// Branch (organizational division).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRecord {
    pub org_id: i64,
    pub short_name: String,
    pub name: String,
}

/// Rolling-stock model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingStockModel {
    pub name: String,
    pub short_name: String,
}

/// Freight descriptor (ETSNG).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreightRecord {
    pub etsng_code: String,
    pub name: String,
    pub group_num: i32,
}

/// Cargo group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CargoGroupRecord {
    pub group_num: i32,
    pub short_name: String,
}

/// Cognos ↔ SAP client identifier mapping entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMapping {
    pub cognos_id: Option<String>,
    pub sap_id: String,
    pub name: String,
}

/// Immutable copy of every reference dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    pub stations: Vec<StationRecord>,
    pub branches: Vec<BranchRecord>,
    pub rolling_stock: Vec<RollingStockModel>,
    pub freight: Vec<FreightRecord>,
    pub cargo_groups: Vec<CargoGroupRecord>,
    pub clients: Vec<ClientMapping>,
}

/// Outcome of upserting SAP clients into the mapping table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientUpsertOutcome {
    pub inserted: usize,
    pub updated: usize,
}

// =============================================================================
// Journal: progress logs, audit trail, stored files
// =============================================================================

/// Progress log entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProgressLevel {
    Start,
    Finish,
    Debug,
    Info,
    Warning,
    Error,
}

impl ProgressLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressLevel::Start => "START",
            ProgressLevel::Finish => "FINISH",
            ProgressLevel::Debug => "DEBUG",
            ProgressLevel::Info => "INFO",
            ProgressLevel::Warning => "WARNING",
            ProgressLevel::Error => "ERROR",
        }
    }
}

impl FromStr for ProgressLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "START" => Ok(Self::Start),
            "FINISH" => Ok(Self::Finish),
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            _ => Err(format!("Unknown progress level: {}", s)),
        }
    }
}

/// Progress log kind for TOU calculations.
pub const CALC_TOU_LOG_KIND: &str = "calc_tou";

/// One operator-visible progress message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub timestamp: DateTime<Utc>,
    pub level: ProgressLevel,
    pub username: String,
    pub message: String,
}

impl fmt::Display for ProgressEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.username,
            self.message
        )
    }
}

/// Identity of the operator performing a state-changing operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub username: String,
}

impl AuditContext {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    /// Context for operations started by the server itself (periodic tasks).
    pub fn system() -> Self {
        Self::new("system")
    }
}

/// Audit trail record written for every state-changing operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub username: String,
    pub action: String,
    pub target: String,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Generated report (name + bytes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportArtifact {
    pub file_name: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// File persisted by the journal store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub id: FileId,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub created_at: DateTime<Utc>,
}
