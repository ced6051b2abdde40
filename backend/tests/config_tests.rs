mod support;

use std::fs;

use support::with_scoped_env;
use tou_backend::config::{AppConfig, CONFIG_PATH_ENV};
use tou_backend::db::repository::FactRepository;
use tou_backend::db::{RepositoryFactory, RepositoryType};

#[test]
fn test_explicit_config_path_with_server_overrides() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    fs::write(
        &path,
        r#"
[repository]
type = "local"

[pipeline]
fetch_chunk_size = 1000
coverage_interval_secs = 3600

[server]
host = "127.0.0.1"
port = 9000
"#,
    )
    .unwrap();
    let path_str = path.to_string_lossy().to_string();

    let config = with_scoped_env(
        &[
            (CONFIG_PATH_ENV, Some(path_str.as_str())),
            ("HOST", None),
            ("PORT", Some("9100")),
        ],
        AppConfig::load_or_default,
    )
    .unwrap();

    assert_eq!(config.pipeline.fetch_chunk_size, 1000);
    assert_eq!(config.pipeline.coverage_interval_secs, 3600);
    assert_eq!(config.pipeline.header_search_rows, 20);
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 9100);
}

#[test]
fn test_missing_explicit_config_is_an_error() {
    let result = with_scoped_env(
        &[(CONFIG_PATH_ENV, Some("/nonexistent/tou.toml"))],
        AppConfig::load_or_default,
    );
    assert!(result.is_err());
}

#[test]
fn test_repository_type_from_env() {
    let kind = with_scoped_env(
        &[
            ("REPOSITORY_TYPE", Some("local")),
            ("DATABASE_URL", Some("postgres://ignored")),
        ],
        RepositoryType::from_env,
    );
    assert_eq!(kind, RepositoryType::Local);
}

#[tokio::test]
async fn test_factory_builds_local_repository() {
    let config = AppConfig::from_toml_str("[repository]\ntype = \"local\"\n").unwrap();
    let repo = RepositoryFactory::from_app_config(&config).await.unwrap();
    assert!(repo.health_check().await.unwrap());
}
