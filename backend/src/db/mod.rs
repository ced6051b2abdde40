//! Persistence for canonical facts, coverage, calculations, seasonal sets,
//! reference dictionaries and the audit/progress journal.
//!
//! Everything above this module talks to a `dyn FullRepository`:
//!
//! ```text
//!   ingest pipeline ─┐
//!   TOU engine ──────┼─► db::services ─► FullRepository
//!   REST handlers ───┘                     ├─ LocalRepository     (in-memory, default)
//!                                          └─ PostgresRepository  (Diesel, `postgres-repo`)
//! ```
//!
//! The backend is chosen once at startup by [`init_repository`] from `tou.toml`
//! and the environment (see [`factory`]).

#[cfg(not(any(feature = "postgres-repo", feature = "local-repo")))]
compile_error!("Enable at least one repository backend feature.");

pub mod checksum;
pub mod factory;
pub mod repositories;
pub mod repository;
pub mod services;

#[cfg(feature = "postgres-repo")]
pub use repositories::postgres::PostgresConfig;

/// Placeholder so signatures stay the same when Postgres support is compiled out.
#[cfg(not(feature = "postgres-repo"))]
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    _private: (),
}

pub use checksum::calculate_checksum;
pub use factory::{RepositoryFactory, RepositoryType};
pub use repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
pub use repositories::PostgresRepository;
pub use repository::{
    CalculationRepository, ErrorContext, FactRepository, FullRepository, JournalRepository,
    ReferenceRepository, RepositoryError, RepositoryResult, SeasonalRepository,
};

use anyhow::{Context, Result};
use std::sync::{Arc, OnceLock};

static REPOSITORY: OnceLock<Arc<dyn FullRepository>> = OnceLock::new();

/// Build the process-wide repository from `config`.
///
/// Later calls return the instance installed by the first one.
pub async fn init_repository(
    config: &crate::config::AppConfig,
) -> Result<&'static Arc<dyn FullRepository>> {
    if let Some(repo) = REPOSITORY.get() {
        return Ok(repo);
    }

    let repo = RepositoryFactory::from_app_config(config)
        .await
        .context("Failed to create repository")?;
    Ok(REPOSITORY.get_or_init(|| repo))
}
