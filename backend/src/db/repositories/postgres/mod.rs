//! Postgres repository implementation using Diesel.
//!
//! ## Features
//!
//! - Connection pooling with r2d2
//! - Automatic retry for transient failures
//! - Automatic migration execution
//! - Atomic period-scoped fact replacement and compare-and-swap status updates
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL` or `PG_DATABASE_URL`: Connection string (required)
//! - `PG_POOL_MAX`: Maximum pool size (default: 10)
//! - `PG_POOL_MIN`: Minimum pool size (default: 1)
//! - `PG_CONN_TIMEOUT_SEC`: Connection timeout in seconds (default: 30)
//! - `PG_IDLE_TIMEOUT_SEC`: Idle connection timeout in seconds (default: 600)
//! - `PG_MAX_RETRIES`: Maximum retry attempts for transient failures (default: 3)
//! - `PG_RETRY_DELAY_MS`: Initial retry delay in milliseconds (default: 100)

use async_trait::async_trait;
use chrono::Utc;
use diesel::dsl::{count, count_distinct};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sql_query;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tokio::task;

use crate::api::{
    AuditEntry, BranchRecord, CalcFilters, CalcId, CalcStatus, CalcTou, CanonicalFact,
    CargoGroupRecord, ClientMapping, ClientUpsertOutcome, CoverageEntry, DateRange, FactQuery,
    FactReplaceOutcome, FileId, FreightRecord, MonthDayCount, NewCalcTou, OperationType,
    ProgressEntry, ReferenceData, RollingStockModel, SeasonalRow, SeasonalSet, SeasonalSetId,
    SeasonalSetInfo, SourceSystem, StationRecord, StoredFile,
};
use crate::db::repository::{
    CalculationRepository, ErrorContext, FactRepository, JournalRepository, ReferenceRepository,
    RepositoryError, RepositoryResult, SeasonalRepository,
};

mod models;
mod schema;

use models::*;
use schema::*;

type PgPool = Pool<ConnectionManager<PgConnection>>;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/db/repositories/postgres/migrations");

/// Rows per multi-row INSERT; keeps statements under the 65535 bind-parameter limit.
const INSERT_CHUNK: usize = 2000;

/// Configuration for connecting to Postgres.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_pool_size: u32,
    /// Minimum number of connections in the pool
    pub min_pool_size: u32,
    /// Connection timeout in seconds
    pub connection_timeout_sec: u64,
    /// Idle connection timeout in seconds
    pub idle_timeout_sec: u64,
    /// Maximum number of retry attempts for transient failures
    pub max_retries: u32,
    /// Initial retry delay in milliseconds (doubles with each retry)
    pub retry_delay_ms: u64,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_pool_size: 10,
            min_pool_size: 1,
            connection_timeout_sec: 30,
            idle_timeout_sec: 600,
            max_retries: 3,
            retry_delay_ms: 100,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl PostgresConfig {
    /// Create configuration from environment variables (see module docs).
    pub fn from_env() -> Result<Self, String> {
        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("PG_DATABASE_URL"))
            .map_err(|_| "DATABASE_URL or PG_DATABASE_URL must be set".to_string())?;

        let defaults = Self::default();
        Ok(Self {
            database_url,
            max_pool_size: env_or("PG_POOL_MAX", defaults.max_pool_size),
            min_pool_size: env_or("PG_POOL_MIN", defaults.min_pool_size),
            connection_timeout_sec: env_or("PG_CONN_TIMEOUT_SEC", defaults.connection_timeout_sec),
            idle_timeout_sec: env_or("PG_IDLE_TIMEOUT_SEC", defaults.idle_timeout_sec),
            max_retries: env_or("PG_MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: env_or("PG_RETRY_DELAY_MS", defaults.retry_delay_ms),
        })
    }

    /// Create a new configuration with a database URL.
    pub fn with_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }
}

/// Diesel-backed repository for Postgres.
#[derive(Clone, Debug)]
pub struct PostgresRepository {
    pool: PgPool,
    config: PostgresConfig,
}

impl PostgresRepository {
    /// Create a new repository and run pending migrations.
    pub fn new(config: PostgresConfig) -> RepositoryResult<Self> {
        let manager = ConnectionManager::<PgConnection>::new(&config.database_url);

        let pool = Pool::builder()
            .max_size(config.max_pool_size)
            .min_idle(Some(config.min_pool_size))
            .connection_timeout(Duration::from_secs(config.connection_timeout_sec))
            .idle_timeout(Some(Duration::from_secs(config.idle_timeout_sec)))
            .test_on_check_out(true)
            .build(manager)
            .map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("create_pool")
                        .with_details(format!("max_size={}", config.max_pool_size)),
                )
            })?;

        {
            let mut conn = pool.get().map_err(|e| {
                RepositoryError::connection_with_context(
                    e.to_string(),
                    ErrorContext::new("get_connection_for_migrations"),
                )
            })?;
            conn.run_pending_migrations(MIGRATIONS).map_err(|e| {
                RepositoryError::internal_with_context(
                    format!("Migration failed: {}", e),
                    ErrorContext::new("run_migrations"),
                )
            })?;
        }

        Ok(Self { pool, config })
    }

    /// Execute a database operation on a blocking thread, retrying transient failures
    /// with exponential backoff.
    async fn with_conn<T, F>(&self, f: F) -> RepositoryResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> RepositoryResult<T> + Send + 'static + Clone,
    {
        let pool = self.pool.clone();
        let max_retries = self.config.max_retries;
        let retry_delay_ms = self.config.retry_delay_ms;

        task::spawn_blocking(move || {
            let mut last_error = None;
            let mut retry_delay = Duration::from_millis(retry_delay_ms);

            for attempt in 0..=max_retries {
                if attempt > 0 {
                    std::thread::sleep(retry_delay);
                    retry_delay *= 2;
                }

                let mut conn = match pool.get() {
                    Ok(c) => c,
                    Err(e) => {
                        last_error = Some(RepositoryError::connection_with_context(
                            e.to_string(),
                            ErrorContext::new("get_connection")
                                .with_details(format!("attempt={}", attempt + 1))
                                .retryable(),
                        ));
                        continue;
                    }
                };

                match f.clone()(&mut conn) {
                    Ok(result) => return Ok(result),
                    Err(e) if e.is_retryable() && attempt < max_retries => {
                        last_error = Some(e);
                    }
                    Err(e) => return Err(e),
                }
            }

            Err(last_error.unwrap_or_else(|| {
                RepositoryError::internal("Max retries exceeded with no error captured")
            }))
        })
        .await
        .map_err(|e| {
            RepositoryError::internal_with_context(
                format!("Task join error: {}", e),
                ErrorContext::new("spawn_blocking"),
            )
        })?
    }
}

fn calc_not_found(id: CalcId) -> RepositoryError {
    RepositoryError::not_found_with_context(
        format!("Calculation {} not found", id),
        ErrorContext::default()
            .with_entity("calc_tou")
            .with_entity_id(id),
    )
}

fn set_not_found(id: SeasonalSetId) -> RepositoryError {
    RepositoryError::not_found_with_context(
        format!("Seasonal coefficient set {} not found", id),
        ErrorContext::default()
            .with_entity("seasonal_set")
            .with_entity_id(id),
    )
}

fn op_strings(ops: &[OperationType]) -> Vec<String> {
    ops.iter().map(|op| op.as_str().to_string()).collect()
}

/// Delete every row of a dictionary table and insert `rows` in chunks.
macro_rules! replace_table {
    ($tx:expr, $table:path, $rows:expr) => {{
        diesel::delete($table).execute($tx)?;
        for chunk in $rows.chunks(INSERT_CHUNK) {
            diesel::insert_into($table).values(chunk).execute($tx)?;
        }
        Ok($rows.len())
    }};
}

// ==================== Facts ====================

#[async_trait]
impl FactRepository for PostgresRepository {
    async fn health_check(&self) -> RepositoryResult<bool> {
        self.with_conn(|conn| {
            sql_query("SELECT 1")
                .execute(conn)
                .map(|_| true)
                .map_err(RepositoryError::from)
        })
        .await
    }

    async fn replace_facts(
        &self,
        source: SourceSystem,
        overwrite: Option<DateRange>,
        facts: &[CanonicalFact],
    ) -> RepositoryResult<FactReplaceOutcome> {
        let rows: Vec<NewFactRow> = facts.iter().map(NewFactRow::from).collect();
        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                let deleted = match overwrite {
                    Some(range) => diesel::delete(
                        facts::table
                            .filter(facts::load_from.eq(source.as_str()))
                            .filter(facts::date_rep.between(range.from, range.to)),
                    )
                    .execute(tx)?,
                    None => 0,
                };

                for chunk in rows.chunks(INSERT_CHUNK) {
                    diesel::insert_into(facts::table).values(chunk).execute(tx)?;
                }

                Ok(FactReplaceOutcome {
                    deleted,
                    inserted: rows.len(),
                })
            })
        })
        .await
    }

    async fn fetch_facts_page(
        &self,
        query: &FactQuery,
        offset: usize,
        limit: usize,
    ) -> RepositoryResult<Vec<CanonicalFact>> {
        let query = query.clone();
        let rows = self
            .with_conn(move |conn| {
                let mut q = facts::table
                    .select(FactRow::as_select())
                    .filter(facts::date_rep.between(query.range.from, query.range.to))
                    .into_boxed();
                if let Some(org_id) = query.org_id {
                    q = q.filter(facts::org_id.eq(org_id));
                }
                if !query.operation_types.is_empty() {
                    q = q.filter(facts::type_op.eq_any(op_strings(&query.operation_types)));
                }
                if !query.rps.is_empty() {
                    q = q.filter(facts::rps_short.eq_any(query.rps.clone()));
                }
                if !query.stations.is_empty() {
                    q = q.filter(facts::st_code.eq_any(query.stations.clone()));
                }
                q.order(facts::fact_id.asc())
                    .offset(offset as i64)
                    .limit(limit as i64)
                    .load::<FactRow>(conn)
                    .map_err(RepositoryError::from)
            })
            .await?;

        rows.into_iter().map(FactRow::into_fact).collect()
    }

    async fn count_distinct_dates(&self, range: DateRange) -> RepositoryResult<usize> {
        self.with_conn(move |conn| {
            let n: i64 = facts::table
                .filter(facts::date_rep.between(range.from, range.to))
                .select(count_distinct(facts::date_rep))
                .first(conn)?;
            Ok(n as usize)
        })
        .await
    }

    async fn distinct_days_by_month(&self) -> RepositoryResult<Vec<MonthDayCount>> {
        let rows = self
            .with_conn(|conn| {
                sql_query(
                    "SELECT EXTRACT(YEAR FROM d)::int4 AS year, \
                            EXTRACT(MONTH FROM d)::int4 AS month, \
                            COUNT(*)::int4 AS distinct_days \
                     FROM (SELECT DISTINCT date_rep AS d FROM facts) days \
                     GROUP BY 1, 2 ORDER BY 1, 2",
                )
                .load::<MonthDayCountRow>(conn)
                .map_err(RepositoryError::from)
            })
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| MonthDayCount {
                year: r.year,
                month: r.month as u32,
                distinct_days: r.distinct_days as u32,
            })
            .collect())
    }

    async fn count_facts(&self) -> RepositoryResult<usize> {
        self.with_conn(|conn| {
            let n: i64 = facts::table.count().get_result(conn)?;
            Ok(n as usize)
        })
        .await
    }

    async fn replace_coverage(&self, entries: &[CoverageEntry]) -> RepositoryResult<()> {
        let mut entries = entries.to_vec();
        entries.sort();
        entries.dedup();
        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                diesel::delete(fact_coverage::table).execute(tx)?;
                let values: Vec<_> = entries
                    .iter()
                    .map(|e| {
                        (
                            fact_coverage::year.eq(e.year),
                            fact_coverage::month.eq(e.month as i32),
                        )
                    })
                    .collect();
                if !values.is_empty() {
                    diesel::insert_into(fact_coverage::table)
                        .values(&values)
                        .execute(tx)?;
                }
                Ok(())
            })
        })
        .await
    }

    async fn list_coverage(&self) -> RepositoryResult<Vec<CoverageEntry>> {
        let rows: Vec<(i32, i32)> = self
            .with_conn(|conn| {
                fact_coverage::table
                    .select((fact_coverage::year, fact_coverage::month))
                    .order((fact_coverage::year.asc(), fact_coverage::month.asc()))
                    .load(conn)
                    .map_err(RepositoryError::from)
            })
            .await?;
        Ok(rows
            .into_iter()
            .map(|(year, month)| CoverageEntry {
                year,
                month: month as u32,
            })
            .collect())
    }
}

// ==================== Calculations ====================

#[async_trait]
impl CalculationRepository for PostgresRepository {
    async fn create_calculation(
        &self,
        calc: &NewCalcTou,
        author: &str,
        parent_id: Option<CalcId>,
    ) -> RepositoryResult<CalcTou> {
        let row = NewCalcTouRow {
            fields: CalcTouFields::from(calc),
            author: author.to_string(),
            status: CalcStatus::New.as_str().to_string(),
            parent_id: parent_id.map(|p| p.value()),
        };
        let inserted = self
            .with_conn(move |conn| {
                diesel::insert_into(calc_tou::table)
                    .values(&row)
                    .returning(CalcTouRow::as_returning())
                    .get_result::<CalcTouRow>(conn)
                    .map_err(RepositoryError::from)
            })
            .await?;
        inserted.into_calc()
    }

    async fn get_calculation(&self, id: CalcId) -> RepositoryResult<CalcTou> {
        let row = self
            .with_conn(move |conn| {
                calc_tou::table
                    .find(id.value())
                    .select(CalcTouRow::as_select())
                    .first::<CalcTouRow>(conn)
                    .optional()
                    .map_err(RepositoryError::from)
            })
            .await?;
        row.ok_or_else(|| calc_not_found(id))?.into_calc()
    }

    async fn list_calculations(&self) -> RepositoryResult<Vec<CalcTou>> {
        let rows = self
            .with_conn(|conn| {
                calc_tou::table
                    .select(CalcTouRow::as_select())
                    .order(calc_tou::calc_id.desc())
                    .load::<CalcTouRow>(conn)
                    .map_err(RepositoryError::from)
            })
            .await?;
        rows.into_iter().map(CalcTouRow::into_calc).collect()
    }

    async fn update_calculation(&self, id: CalcId, calc: &NewCalcTou) -> RepositoryResult<CalcTou> {
        let fields = CalcTouFields::from(calc);
        let row = self
            .with_conn(move |conn| {
                diesel::update(calc_tou::table.find(id.value()))
                    .set((&fields, calc_tou::updated_at.eq(Utc::now())))
                    .returning(CalcTouRow::as_returning())
                    .get_result::<CalcTouRow>(conn)
                    .optional()
                    .map_err(RepositoryError::from)
            })
            .await?;
        row.ok_or_else(|| calc_not_found(id))?.into_calc()
    }

    async fn delete_calculation(&self, id: CalcId) -> RepositoryResult<bool> {
        self.with_conn(move |conn| {
            let n = diesel::delete(calc_tou::table.find(id.value())).execute(conn)?;
            Ok(n > 0)
        })
        .await
    }

    async fn get_filters(&self, id: CalcId) -> RepositoryResult<CalcFilters> {
        let (rps, ops, stations) = self
            .with_conn(move |conn| {
                let calc = id.value();
                let rps: Vec<String> = calc_tou_rps::table
                    .filter(calc_tou_rps::calc_id.eq(calc))
                    .select(calc_tou_rps::rps_short)
                    .order(calc_tou_rps::rps_short.asc())
                    .load(conn)?;
                let ops: Vec<String> = calc_tou_type_operation::table
                    .filter(calc_tou_type_operation::calc_id.eq(calc))
                    .select(calc_tou_type_operation::type_op)
                    .load(conn)?;
                let stations: Vec<String> = calc_tou_station::table
                    .filter(calc_tou_station::calc_id.eq(calc))
                    .select(calc_tou_station::st_code)
                    .order(calc_tou_station::st_code.asc())
                    .load(conn)?;
                Ok((rps, ops, stations))
            })
            .await?;

        let mut operation_types = ops
            .iter()
            .map(|s| OperationType::from_str(s).map_err(RepositoryError::validation))
            .collect::<RepositoryResult<Vec<_>>>()?;
        operation_types.sort();

        Ok(CalcFilters {
            rps,
            operation_types,
            stations,
        })
    }

    async fn replace_rps_filter(&self, id: CalcId, rps: &[String]) -> RepositoryResult<()> {
        let values: Vec<_> = rps
            .iter()
            .map(|r| {
                (
                    calc_tou_rps::calc_id.eq(id.value()),
                    calc_tou_rps::rps_short.eq(r.clone()),
                )
            })
            .collect();
        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                diesel::delete(calc_tou_rps::table.filter(calc_tou_rps::calc_id.eq(id.value())))
                    .execute(tx)?;
                diesel::insert_into(calc_tou_rps::table)
                    .values(&values)
                    .on_conflict_do_nothing()
                    .execute(tx)?;
                Ok(())
            })
        })
        .await
    }

    async fn replace_operation_filter(
        &self,
        id: CalcId,
        operations: &[OperationType],
    ) -> RepositoryResult<()> {
        let values: Vec<_> = op_strings(operations)
            .into_iter()
            .map(|op| {
                (
                    calc_tou_type_operation::calc_id.eq(id.value()),
                    calc_tou_type_operation::type_op.eq(op),
                )
            })
            .collect();
        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                diesel::delete(
                    calc_tou_type_operation::table
                        .filter(calc_tou_type_operation::calc_id.eq(id.value())),
                )
                .execute(tx)?;
                diesel::insert_into(calc_tou_type_operation::table)
                    .values(&values)
                    .on_conflict_do_nothing()
                    .execute(tx)?;
                Ok(())
            })
        })
        .await
    }

    async fn replace_station_filter(&self, id: CalcId, stations: &[String]) -> RepositoryResult<()> {
        let values: Vec<_> = stations
            .iter()
            .map(|s| {
                (
                    calc_tou_station::calc_id.eq(id.value()),
                    calc_tou_station::st_code.eq(s.clone()),
                )
            })
            .collect();
        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                diesel::delete(
                    calc_tou_station::table.filter(calc_tou_station::calc_id.eq(id.value())),
                )
                .execute(tx)?;
                diesel::insert_into(calc_tou_station::table)
                    .values(&values)
                    .on_conflict_do_nothing()
                    .execute(tx)?;
                Ok(())
            })
        })
        .await
    }

    async fn transition_status(
        &self,
        id: CalcId,
        from: CalcStatus,
        to: CalcStatus,
    ) -> RepositoryResult<bool> {
        self.with_conn(move |conn| {
            let n = diesel::update(
                calc_tou::table
                    .filter(calc_tou::calc_id.eq(id.value()))
                    .filter(calc_tou::status.eq(from.as_str())),
            )
            .set((
                calc_tou::status.eq(to.as_str()),
                calc_tou::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;
            Ok(n == 1)
        })
        .await
    }

    async fn complete_calculation(&self, id: CalcId, file_id: FileId) -> RepositoryResult<bool> {
        self.with_conn(move |conn| {
            let n = diesel::update(
                calc_tou::table
                    .filter(calc_tou::calc_id.eq(id.value()))
                    .filter(calc_tou::status.eq(CalcStatus::InProcess.as_str())),
            )
            .set((
                calc_tou::status.eq(CalcStatus::Done.as_str()),
                calc_tou::file_id.eq(Some(file_id.value())),
                calc_tou::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;
            Ok(n == 1)
        })
        .await
    }

    async fn calculations_using_seasonal_set(
        &self,
        set_id: SeasonalSetId,
    ) -> RepositoryResult<Vec<(CalcId, CalcStatus)>> {
        let rows: Vec<(i64, String)> = self
            .with_conn(move |conn| {
                calc_tou::table
                    .filter(calc_tou::seasonal_set_id.eq(set_id.value()))
                    .select((calc_tou::calc_id, calc_tou::status))
                    .load(conn)
                    .map_err(RepositoryError::from)
            })
            .await?;
        rows.into_iter()
            .map(|(id, status)| {
                let status = CalcStatus::from_str(&status).map_err(RepositoryError::validation)?;
                Ok((CalcId(id), status))
            })
            .collect()
    }
}

// ==================== Reference dictionaries ====================

#[async_trait]
impl ReferenceRepository for PostgresRepository {
    async fn reference_snapshot(&self) -> RepositoryResult<ReferenceData> {
        self.with_conn(|conn| {
            conn.build_transaction().read_only().run(|tx| {
                let stations = ref_stations::table
                    .select(StationRow::as_select())
                    .order(ref_stations::code.asc())
                    .load::<StationRow>(tx)?;
                let branches = ref_branches::table
                    .select(BranchRow::as_select())
                    .order(ref_branches::org_id.asc())
                    .load::<BranchRow>(tx)?;
                let rolling_stock = ref_rolling_stock::table
                    .select(RollingStockRow::as_select())
                    .load::<RollingStockRow>(tx)?;
                let freight = ref_freight::table
                    .select(FreightRow::as_select())
                    .load::<FreightRow>(tx)?;
                let cargo_groups = ref_cargo_groups::table
                    .select(CargoGroupRow::as_select())
                    .order(ref_cargo_groups::group_num.asc())
                    .load::<CargoGroupRow>(tx)?;
                let clients = ref_client_mapping::table
                    .select(ClientMappingRow::as_select())
                    .load::<ClientMappingRow>(tx)?;

                Ok(ReferenceData {
                    stations: stations.into_iter().map(Into::into).collect(),
                    branches: branches.into_iter().map(Into::into).collect(),
                    rolling_stock: rolling_stock.into_iter().map(Into::into).collect(),
                    freight: freight.into_iter().map(Into::into).collect(),
                    cargo_groups: cargo_groups.into_iter().map(Into::into).collect(),
                    clients: clients.into_iter().map(Into::into).collect(),
                })
            })
        })
        .await
    }

    async fn replace_stations(&self, stations: &[StationRecord]) -> RepositoryResult<usize> {
        let rows: Vec<StationRow> = stations.iter().map(StationRow::from).collect();
        self.with_conn(move |conn| conn.transaction(|tx| replace_table!(tx, ref_stations::table, rows)))
            .await
    }

    async fn replace_branches(&self, branches: &[BranchRecord]) -> RepositoryResult<usize> {
        let rows: Vec<BranchRow> = branches.iter().map(BranchRow::from).collect();
        self.with_conn(move |conn| conn.transaction(|tx| replace_table!(tx, ref_branches::table, rows)))
            .await
    }

    async fn replace_rolling_stock(&self, models: &[RollingStockModel]) -> RepositoryResult<usize> {
        let rows: Vec<RollingStockRow> = models.iter().map(RollingStockRow::from).collect();
        self.with_conn(move |conn| {
            conn.transaction(|tx| replace_table!(tx, ref_rolling_stock::table, rows))
        })
        .await
    }

    async fn replace_freight(&self, freight: &[FreightRecord]) -> RepositoryResult<usize> {
        let rows: Vec<FreightRow> = freight.iter().map(FreightRow::from).collect();
        self.with_conn(move |conn| conn.transaction(|tx| replace_table!(tx, ref_freight::table, rows)))
            .await
    }

    async fn replace_cargo_groups(&self, groups: &[CargoGroupRecord]) -> RepositoryResult<usize> {
        let rows: Vec<CargoGroupRow> = groups.iter().map(CargoGroupRow::from).collect();
        self.with_conn(move |conn| {
            conn.transaction(|tx| replace_table!(tx, ref_cargo_groups::table, rows))
        })
        .await
    }

    async fn replace_client_mapping(&self, clients: &[ClientMapping]) -> RepositoryResult<usize> {
        let rows: Vec<ClientMappingRow> = clients.iter().map(ClientMappingRow::from).collect();
        self.with_conn(move |conn| {
            conn.transaction(|tx| replace_table!(tx, ref_client_mapping::table, rows))
        })
        .await
    }

    async fn upsert_sap_clients(
        &self,
        clients: &[(String, String)],
    ) -> RepositoryResult<ClientUpsertOutcome> {
        let clients = clients.to_vec();
        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                let ids: Vec<&String> = clients.iter().map(|(id, _)| id).collect();
                let existing: HashMap<String, String> = ref_client_mapping::table
                    .filter(ref_client_mapping::sap_id.eq_any(ids))
                    .select((ref_client_mapping::sap_id, ref_client_mapping::name))
                    .load::<(String, String)>(tx)?
                    .into_iter()
                    .collect();

                let mut outcome = ClientUpsertOutcome::default();
                let mut fresh = Vec::new();
                for (sap_id, name) in &clients {
                    match existing.get(sap_id) {
                        Some(current) if current != name => {
                            diesel::update(ref_client_mapping::table.find(sap_id))
                                .set(ref_client_mapping::name.eq(name))
                                .execute(tx)?;
                            outcome.updated += 1;
                        }
                        Some(_) => {}
                        None => fresh.push(ClientMappingRow {
                            sap_id: sap_id.clone(),
                            cognos_id: None,
                            name: name.clone(),
                        }),
                    }
                }

                for chunk in fresh.chunks(INSERT_CHUNK) {
                    outcome.inserted += diesel::insert_into(ref_client_mapping::table)
                        .values(chunk)
                        .on_conflict_do_nothing()
                        .execute(tx)?;
                }
                Ok(outcome)
            })
        })
        .await
    }
}

// ==================== Seasonal coefficients ====================

#[async_trait]
impl SeasonalRepository for PostgresRepository {
    async fn create_seasonal_set(&self, name: &str) -> RepositoryResult<SeasonalSetInfo> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let (id, name): (i64, String) = diesel::insert_into(seasonal_sets::table)
                .values(seasonal_sets::name.eq(&name))
                .returning((seasonal_sets::set_id, seasonal_sets::name))
                .get_result(conn)?;
            Ok(SeasonalSetInfo {
                id: SeasonalSetId(id),
                name,
                row_count: 0,
            })
        })
        .await
    }

    async fn get_seasonal_set(&self, id: SeasonalSetId) -> RepositoryResult<SeasonalSet> {
        let found = self
            .with_conn(move |conn| {
                let name: Option<String> = seasonal_sets::table
                    .find(id.value())
                    .select(seasonal_sets::name)
                    .first(conn)
                    .optional()?;
                let Some(name) = name else {
                    return Ok(None);
                };
                let rows = seasonal_rows::table
                    .filter(seasonal_rows::set_id.eq(id.value()))
                    .select(SeasonalRowRecord::as_select())
                    .order((seasonal_rows::rps_short.asc(), seasonal_rows::type_op.asc()))
                    .load::<SeasonalRowRecord>(conn)?;
                Ok(Some((name, rows)))
            })
            .await?;

        let (name, rows) = found.ok_or_else(|| set_not_found(id))?;
        Ok(SeasonalSet {
            id,
            name,
            rows: rows
                .into_iter()
                .map(SeasonalRowRecord::into_row)
                .collect::<RepositoryResult<Vec<_>>>()?,
        })
    }

    async fn list_seasonal_sets(&self) -> RepositoryResult<Vec<SeasonalSetInfo>> {
        self.with_conn(|conn| {
            let sets: Vec<(i64, String)> = seasonal_sets::table
                .select((seasonal_sets::set_id, seasonal_sets::name))
                .order(seasonal_sets::set_id.asc())
                .load(conn)?;
            let counts: HashMap<i64, i64> = seasonal_rows::table
                .group_by(seasonal_rows::set_id)
                .select((seasonal_rows::set_id, count(seasonal_rows::rps_short)))
                .load::<(i64, i64)>(conn)?
                .into_iter()
                .collect();

            Ok(sets
                .into_iter()
                .map(|(id, name)| SeasonalSetInfo {
                    id: SeasonalSetId(id),
                    name,
                    row_count: counts.get(&id).copied().unwrap_or(0) as usize,
                })
                .collect())
        })
        .await
    }

    async fn rename_seasonal_set(&self, id: SeasonalSetId, name: &str) -> RepositoryResult<()> {
        let name = name.to_string();
        let n = self
            .with_conn(move |conn| {
                diesel::update(seasonal_sets::table.find(id.value()))
                    .set(seasonal_sets::name.eq(&name))
                    .execute(conn)
                    .map_err(RepositoryError::from)
            })
            .await?;
        if n == 0 {
            return Err(set_not_found(id));
        }
        Ok(())
    }

    async fn replace_seasonal_rows(
        &self,
        id: SeasonalSetId,
        rows: &[SeasonalRow],
    ) -> RepositoryResult<usize> {
        let records: Vec<SeasonalRowRecord> = rows
            .iter()
            .map(|r| SeasonalRowRecord::from_row(id, r))
            .collect();
        let written = self
            .with_conn(move |conn| {
                conn.transaction(|tx| {
                    let exists: Option<i64> = seasonal_sets::table
                        .find(id.value())
                        .select(seasonal_sets::set_id)
                        .first(tx)
                        .optional()?;
                    if exists.is_none() {
                        return Ok(None);
                    }
                    diesel::delete(seasonal_rows::table.filter(seasonal_rows::set_id.eq(id.value())))
                        .execute(tx)?;
                    for chunk in records.chunks(INSERT_CHUNK) {
                        diesel::insert_into(seasonal_rows::table)
                            .values(chunk)
                            .execute(tx)?;
                    }
                    Ok(Some(records.len()))
                })
            })
            .await?;
        written.ok_or_else(|| set_not_found(id))
    }

    async fn delete_seasonal_set(&self, id: SeasonalSetId) -> RepositoryResult<bool> {
        self.with_conn(move |conn| {
            let n = diesel::delete(seasonal_sets::table.find(id.value())).execute(conn)?;
            Ok(n > 0)
        })
        .await
    }
}

// ==================== Journal ====================

#[async_trait]
impl JournalRepository for PostgresRepository {
    async fn append_progress(
        &self,
        parent_id: i64,
        kind: &str,
        entry: &ProgressEntry,
        reset: bool,
    ) -> RepositoryResult<()> {
        let row = NewProgressRow {
            parent_id,
            kind: kind.to_string(),
            logged_at: entry.timestamp,
            level: entry.level.as_str().to_string(),
            username: entry.username.clone(),
            message: entry.message.clone(),
        };
        self.with_conn(move |conn| {
            conn.transaction(|tx| {
                if reset {
                    diesel::delete(
                        progress_log::table
                            .filter(progress_log::parent_id.eq(row.parent_id))
                            .filter(progress_log::kind.eq(&row.kind)),
                    )
                    .execute(tx)?;
                }
                diesel::insert_into(progress_log::table)
                    .values(&row)
                    .execute(tx)?;
                Ok(())
            })
        })
        .await
    }

    async fn fetch_progress(
        &self,
        parent_id: i64,
        kind: &str,
    ) -> RepositoryResult<Vec<ProgressEntry>> {
        let kind = kind.to_string();
        let rows = self
            .with_conn(move |conn| {
                progress_log::table
                    .filter(progress_log::parent_id.eq(parent_id))
                    .filter(progress_log::kind.eq(&kind))
                    .select(ProgressRow::as_select())
                    .order(progress_log::entry_id.asc())
                    .load::<ProgressRow>(conn)
                    .map_err(RepositoryError::from)
            })
            .await?;
        rows.into_iter().map(ProgressRow::into_entry).collect()
    }

    async fn record_audit(&self, entry: &AuditEntry) -> RepositoryResult<()> {
        let row = NewAuditRow::from(entry);
        self.with_conn(move |conn| {
            diesel::insert_into(audit_log::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    async fn list_audit(&self, limit: usize) -> RepositoryResult<Vec<AuditEntry>> {
        let rows = self
            .with_conn(move |conn| {
                audit_log::table
                    .select(AuditRow::as_select())
                    .order(audit_log::entry_id.desc())
                    .limit(limit as i64)
                    .load::<AuditRow>(conn)
                    .map_err(RepositoryError::from)
            })
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn store_file(&self, file_name: &str, bytes: &[u8]) -> RepositoryResult<FileId> {
        let row = NewStoredFileRow {
            file_name: file_name.to_string(),
            content: bytes.to_vec(),
        };
        self.with_conn(move |conn| {
            let id: i64 = diesel::insert_into(stored_files::table)
                .values(&row)
                .returning(stored_files::file_id)
                .get_result(conn)?;
            Ok(FileId(id))
        })
        .await
    }

    async fn get_file(&self, id: FileId) -> RepositoryResult<StoredFile> {
        let row = self
            .with_conn(move |conn| {
                stored_files::table
                    .find(id.value())
                    .select(StoredFileRow::as_select())
                    .first::<StoredFileRow>(conn)
                    .optional()
                    .map_err(RepositoryError::from)
            })
            .await?;
        row.map(Into::into).ok_or_else(|| {
            RepositoryError::not_found_with_context(
                format!("File {} not found", id),
                ErrorContext::default().with_entity("file").with_entity_id(id),
            )
        })
    }
}
