//! Storage backend selection.
//!
//! The backend comes from `[repository].type` in `tou.toml`. `REPOSITORY_TYPE`
//! overrides it, and for Postgres a `DATABASE_URL` / `PG_DATABASE_URL` in the
//! environment takes precedence over `[postgres].database_url`.

use std::str::FromStr;
use std::sync::Arc;

use log::info;

use super::repositories::LocalRepository;
#[cfg(feature = "postgres-repo")]
use super::repositories::PostgresRepository;
use super::repository::{FullRepository, RepositoryError, RepositoryResult};
use super::PostgresConfig;
use crate::config::AppConfig;

const REPOSITORY_TYPE_ENV: &str = "REPOSITORY_TYPE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryType {
    /// Diesel over an r2d2 pool
    Postgres,
    /// In-memory, lost on restart
    Local,
}

impl FromStr for RepositoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "local" | "memory" => Ok(Self::Local),
            _ => Err(format!("Unknown repository type: {}", s)),
        }
    }
}

impl RepositoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Local => "local",
        }
    }

    /// `REPOSITORY_TYPE` when set and valid; otherwise Postgres if a database
    /// URL is exported, else Local.
    pub fn from_env() -> Self {
        if let Some(kind) = Self::env_override() {
            return kind;
        }
        if database_url_in_env() {
            Self::Postgres
        } else {
            Self::Local
        }
    }

    fn env_override() -> Option<Self> {
        std::env::var(REPOSITORY_TYPE_ENV)
            .ok()
            .and_then(|v| v.parse().ok())
    }
}

fn database_url_in_env() -> bool {
    std::env::var("DATABASE_URL").is_ok() || std::env::var("PG_DATABASE_URL").is_ok()
}

pub struct RepositoryFactory;

impl RepositoryFactory {
    /// Build a backend of the given type. Postgres needs its settings.
    pub async fn create(
        repo_type: RepositoryType,
        postgres_config: Option<PostgresConfig>,
    ) -> RepositoryResult<Arc<dyn FullRepository>> {
        match repo_type {
            RepositoryType::Local => Ok(Self::create_local()),
            RepositoryType::Postgres => Self::create_postgres(postgres_config).await,
        }
    }

    pub fn create_local() -> Arc<dyn FullRepository> {
        Arc::new(LocalRepository::new())
    }

    /// Connects and runs pending migrations off the async runtime.
    #[cfg(feature = "postgres-repo")]
    async fn create_postgres(
        config: Option<PostgresConfig>,
    ) -> RepositoryResult<Arc<dyn FullRepository>> {
        let config = config.ok_or_else(|| {
            RepositoryError::configuration("Postgres repository requires a database_url")
        })?;
        let repo = tokio::task::spawn_blocking(move || PostgresRepository::new(config))
            .await
            .map_err(|e| RepositoryError::internal(format!("Task join error: {}", e)))??;
        Ok(Arc::new(repo))
    }

    #[cfg(not(feature = "postgres-repo"))]
    async fn create_postgres(
        _config: Option<PostgresConfig>,
    ) -> RepositoryResult<Arc<dyn FullRepository>> {
        Err(RepositoryError::configuration(
            "Postgres repository feature not enabled",
        ))
    }

    /// Resolve the backend from `config` plus environment overrides.
    pub async fn from_app_config(config: &AppConfig) -> RepositoryResult<Arc<dyn FullRepository>> {
        let repo_type = match RepositoryType::env_override() {
            Some(kind) => kind,
            None => config.repository_type().map_err(RepositoryError::configuration)?,
        };
        info!("Using {} repository", repo_type.as_str());

        let postgres_config = match repo_type {
            RepositoryType::Local => None,
            RepositoryType::Postgres => Some(postgres_settings(config)?),
        };
        Self::create(repo_type, postgres_config).await
    }
}

#[cfg(feature = "postgres-repo")]
fn postgres_settings(config: &AppConfig) -> RepositoryResult<PostgresConfig> {
    if database_url_in_env() {
        return PostgresConfig::from_env().map_err(RepositoryError::configuration);
    }
    let mut pg = config.postgres_config();
    if pg.database_url.is_empty() {
        return Err(RepositoryError::configuration(
            "Postgres repository requires 'postgres.database_url' setting",
        ));
    }
    pg.database_url = pg.database_url.trim().to_string();
    Ok(pg)
}

#[cfg(not(feature = "postgres-repo"))]
fn postgres_settings(_config: &AppConfig) -> RepositoryResult<PostgresConfig> {
    Err(RepositoryError::configuration(
        "Postgres repository feature not enabled",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::FactRepository;

    #[test]
    fn test_repository_type_from_str() {
        assert_eq!("local".parse::<RepositoryType>(), Ok(RepositoryType::Local));
        assert_eq!(" Pg ".parse::<RepositoryType>(), Ok(RepositoryType::Postgres));
        assert!("sqlite".parse::<RepositoryType>().is_err());
        assert_eq!(RepositoryType::Postgres.as_str(), "postgres");
    }

    #[tokio::test]
    async fn test_create_local_repository() {
        let repo = RepositoryFactory::create(RepositoryType::Local, None)
            .await
            .unwrap();
        assert!(repo.health_check().await.unwrap());
        assert_eq!(repo.count_facts().await.unwrap(), 0);
    }

    #[cfg(not(feature = "postgres-repo"))]
    #[tokio::test]
    async fn test_postgres_without_feature_is_configuration_error() {
        let err = RepositoryFactory::create(RepositoryType::Postgres, None)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RepositoryError::Configuration { .. }));
    }
}
