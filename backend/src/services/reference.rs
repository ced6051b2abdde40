//! Reference dictionaries: startup seeding from CSV files and the client
//! mapping spreadsheet import.

use std::path::Path;

use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::{ServiceError, ServiceResult};
use super::fact_import::UploadedFile;
use crate::api::{
    AuditContext, BranchRecord, CargoGroupRecord, ClientMapping, FreightRecord, RollingStockModel,
    StationRecord,
};
use crate::db::repository::FullRepository;
use crate::db::services as db_services;
use crate::ingest::{read_grid, IngestError, IngestResult, Table};

pub const STATIONS_FILE: &str = "stations.csv";
pub const BRANCHES_FILE: &str = "branches.csv";
pub const ROLLING_STOCK_FILE: &str = "rolling_stock.csv";
pub const FREIGHT_FILE: &str = "freight.csv";
pub const CARGO_GROUPS_FILE: &str = "cargo_groups.csv";
pub const CLIENT_MAPPING_FILE: &str = "client_mapping.csv";

pub const COGNOS_ID_COLUMN: &str = "ID ASU text";
pub const SAP_ID_COLUMN: &str = "ID SAP text";
pub const CLIENT_NAME_COLUMN: &str = "Сокр Клиент";

/// Number of records loaded per dictionary; `None` when the file was absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReferenceLoadOutcome {
    pub stations: Option<usize>,
    pub branches: Option<usize>,
    pub rolling_stock: Option<usize>,
    pub freight: Option<usize>,
    pub cargo_groups: Option<usize>,
    pub clients: Option<usize>,
}

/// Parse a headed CSV document into records.
pub fn parse_csv<T: DeserializeOwned>(file_name: &str, bytes: &[u8]) -> IngestResult<Vec<T>> {
    let bytes = bytes.strip_prefix("\u{feff}".as_bytes()).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(bytes);
    reader
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .map_err(|e| IngestError::unreadable(file_name, e))
}

async fn read_optional<T: DeserializeOwned>(dir: &Path, file_name: &str) -> ServiceResult<Option<Vec<T>>> {
    let path = dir.join(file_name);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(Some(parse_csv(file_name, &bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Reference file {} not found, dictionary left unchanged", path.display());
            Ok(None)
        }
        Err(e) => Err(ServiceError::Format(IngestError::unreadable(file_name, e))),
    }
}

/// Replace every dictionary whose CSV file is present in `dir`.
pub async fn load_reference_dir<R: FullRepository + ?Sized>(
    repo: &R,
    dir: &Path,
    ctx: &AuditContext,
) -> ServiceResult<ReferenceLoadOutcome> {
    let result = load_reference_dir_inner(repo, dir).await;
    db_services::audit(
        repo,
        ctx,
        "reference.load",
        dir.display().to_string(),
        result.as_ref().map(|_| ()).map_err(|e| e.to_string()),
    )
    .await;
    result
}

async fn load_reference_dir_inner<R: FullRepository + ?Sized>(
    repo: &R,
    dir: &Path,
) -> ServiceResult<ReferenceLoadOutcome> {
    let mut outcome = ReferenceLoadOutcome::default();

    if let Some(records) = read_optional::<StationRecord>(dir, STATIONS_FILE).await? {
        outcome.stations = Some(repo.replace_stations(&records).await?);
    }
    if let Some(records) = read_optional::<BranchRecord>(dir, BRANCHES_FILE).await? {
        outcome.branches = Some(repo.replace_branches(&records).await?);
    }
    if let Some(records) = read_optional::<RollingStockModel>(dir, ROLLING_STOCK_FILE).await? {
        outcome.rolling_stock = Some(repo.replace_rolling_stock(&records).await?);
    }
    if let Some(records) = read_optional::<FreightRecord>(dir, FREIGHT_FILE).await? {
        outcome.freight = Some(repo.replace_freight(&records).await?);
    }
    if let Some(records) = read_optional::<CargoGroupRecord>(dir, CARGO_GROUPS_FILE).await? {
        outcome.cargo_groups = Some(repo.replace_cargo_groups(&records).await?);
    }
    if let Some(records) = read_optional::<ClientMapping>(dir, CLIENT_MAPPING_FILE).await? {
        outcome.clients = Some(repo.replace_client_mapping(&records).await?);
    }

    info!("Reference dictionaries loaded from {}: {:?}", dir.display(), outcome);
    Ok(outcome)
}

/// Parse the client mapping spreadsheet. Rows without a SAP id are skipped.
pub fn parse_client_mapping(
    file_name: &str,
    bytes: &[u8],
    search_rows: usize,
) -> IngestResult<Vec<ClientMapping>> {
    let grid = read_grid(bytes, file_name)?;
    let table = Table::locate(
        grid,
        &[COGNOS_ID_COLUMN, SAP_ID_COLUMN, CLIENT_NAME_COLUMN],
        search_rows,
        0,
    )?;
    let cognos_col = table.require(COGNOS_ID_COLUMN)?;
    let sap_col = table.require(SAP_ID_COLUMN)?;
    let name_col = table.require(CLIENT_NAME_COLUMN)?;

    let clients: Vec<ClientMapping> = table
        .records()
        .filter_map(|record| {
            let sap_id = record.get(sap_col).as_code()?;
            let name = record
                .get(name_col)
                .as_string()
                .unwrap_or_else(|| sap_id.clone());
            Some(ClientMapping {
                cognos_id: record.get(cognos_col).as_code(),
                sap_id,
                name,
            })
        })
        .collect();
    if clients.is_empty() {
        return Err(IngestError::EmptyImport(file_name.to_string()));
    }
    Ok(clients)
}

/// Replace the client mapping table from an uploaded spreadsheet.
pub async fn import_client_mapping<R: FullRepository + ?Sized>(
    repo: &R,
    file: UploadedFile,
    search_rows: usize,
    ctx: &AuditContext,
) -> ServiceResult<usize> {
    let file_name = file.file_name.clone();
    let result = async {
        let clients = tokio::task::spawn_blocking(move || {
            parse_client_mapping(&file.file_name, &file.bytes, search_rows)
        })
        .await??;
        let stored = repo.replace_client_mapping(&clients).await?;
        info!("Client mapping replaced: {} entries", stored);
        Ok::<_, ServiceError>(stored)
    }
    .await;
    db_services::audit(
        repo,
        ctx,
        "reference.client_mapping.import",
        file_name,
        result.as_ref().map(|_| ()).map_err(|e| e.to_string()),
    )
    .await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::LocalRepository;
    use crate::db::repository::ReferenceRepository;
    use std::fs;

    #[test]
    fn test_parse_stations_with_optional_fields() {
        let csv = "code,legacy_code,name,org_id\n100005,10000,Северная,7\n200001,,Южная,\n";
        let stations: Vec<StationRecord> = parse_csv(STATIONS_FILE, csv.as_bytes()).unwrap();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].legacy_code.as_deref(), Some("10000"));
        assert_eq!(stations[1].legacy_code, None);
        assert_eq!(stations[1].org_id, None);
    }

    #[test]
    fn test_parse_client_mapping_skips_rows_without_sap_id() {
        let csv = "ID ASU text;ID SAP text;Сокр Клиент\n11;501;Ромашка\n12;;Без SAP\n;502;\n";
        let clients = parse_client_mapping("clients.csv", csv.as_bytes(), 20).unwrap();
        assert_eq!(clients.len(), 2);
        assert_eq!(clients[0].cognos_id.as_deref(), Some("11"));
        assert_eq!(clients[1].cognos_id, None);
        assert_eq!(clients[1].name, "502");
    }

    #[tokio::test]
    async fn test_load_reference_dir_skips_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(BRANCHES_FILE),
            "org_id,short_name,name\n7,СФ,Северный филиал\n",
        )
        .unwrap();
        fs::write(
            dir.path().join(CARGO_GROUPS_FILE),
            "group_num,short_name\n1,Уголь\n2,Руда\n",
        )
        .unwrap();

        let repo = LocalRepository::new();
        let outcome = load_reference_dir(&repo, dir.path(), &AuditContext::system())
            .await
            .unwrap();
        assert_eq!(outcome.branches, Some(1));
        assert_eq!(outcome.cargo_groups, Some(2));
        assert_eq!(outcome.stations, None);

        let snapshot = repo.reference_snapshot().await.unwrap();
        assert_eq!(snapshot.cargo_groups.len(), 2);
    }
}
