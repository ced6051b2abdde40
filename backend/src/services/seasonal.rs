//! Seasonal coefficient sets: guarded CRUD, spreadsheet import and CSV export.
//!
//! A set used by any calculation past NEW is immutable; a set used by any
//! calculation at all cannot be deleted.

use log::info;

use super::error::{ServiceError, ServiceResult};
use super::fact_import::UploadedFile;
use crate::api::{
    AuditContext, CalcStatus, OperationType, SeasonalRow, SeasonalSet, SeasonalSetId,
    SeasonalSetInfo,
};
use crate::db::repository::FullRepository;
use crate::db::services as db_services;
use crate::ingest::{read_grid, IngestError, IngestResult, Table};

pub const RPS_COLUMN: &str = "Род вагона";
pub const OPERATION_COLUMN: &str = "Тип операции";

/// `СК01`..`СК12`
pub fn coefficient_columns() -> Vec<String> {
    (1..=12).map(|m| format!("СК{:02}", m)).collect()
}

fn target(id: SeasonalSetId) -> String {
    format!("seasonal_set:{}", id)
}

fn result_of<T>(result: &ServiceResult<T>) -> Result<(), String> {
    result.as_ref().map(|_| ()).map_err(|e| e.to_string())
}

async fn ensure_can_update<R: FullRepository + ?Sized>(
    repo: &R,
    id: SeasonalSetId,
) -> ServiceResult<()> {
    repo.get_seasonal_set(id).await?;
    let users = repo.calculations_using_seasonal_set(id).await?;
    if users.iter().any(|(_, status)| *status != CalcStatus::New) {
        return Err(ServiceError::Guard(format!(
            "Seasonal set {} cannot be updated (used in calc_tou with status != {})",
            id,
            CalcStatus::New
        )));
    }
    Ok(())
}

async fn ensure_can_delete<R: FullRepository + ?Sized>(
    repo: &R,
    id: SeasonalSetId,
) -> ServiceResult<()> {
    repo.get_seasonal_set(id).await?;
    if !repo.calculations_using_seasonal_set(id).await?.is_empty() {
        return Err(ServiceError::Guard(format!(
            "Seasonal set {} cannot be deleted (used in calc_tou)",
            id
        )));
    }
    Ok(())
}

pub async fn list<R: FullRepository + ?Sized>(repo: &R) -> ServiceResult<Vec<SeasonalSetInfo>> {
    Ok(repo.list_seasonal_sets().await?)
}

pub async fn get<R: FullRepository + ?Sized>(
    repo: &R,
    id: SeasonalSetId,
) -> ServiceResult<SeasonalSet> {
    Ok(repo.get_seasonal_set(id).await?)
}

/// Create a named set with optional initial rows.
pub async fn create<R: FullRepository + ?Sized>(
    repo: &R,
    name: &str,
    rows: &[SeasonalRow],
    ctx: &AuditContext,
) -> ServiceResult<SeasonalSet> {
    let result = create_inner(repo, name, rows).await;
    let target = match &result {
        Ok(set) => target(set.id),
        Err(_) => format!("seasonal_set:{}", name),
    };
    db_services::audit(repo, ctx, "seasonal.create", target, result_of(&result)).await;
    result
}

async fn create_inner<R: FullRepository + ?Sized>(
    repo: &R,
    name: &str,
    rows: &[SeasonalRow],
) -> ServiceResult<SeasonalSet> {
    if name.trim().is_empty() {
        return Err(ServiceError::Validation("Seasonal set name must not be empty".into()));
    }
    let info = repo.create_seasonal_set(name.trim()).await?;
    if !rows.is_empty() {
        repo.replace_seasonal_rows(info.id, rows).await?;
    }
    Ok(repo.get_seasonal_set(info.id).await?)
}

pub async fn rename<R: FullRepository + ?Sized>(
    repo: &R,
    id: SeasonalSetId,
    name: &str,
    ctx: &AuditContext,
) -> ServiceResult<SeasonalSet> {
    let result = async {
        if name.trim().is_empty() {
            return Err(ServiceError::Validation("Seasonal set name must not be empty".into()));
        }
        ensure_can_update(repo, id).await?;
        repo.rename_seasonal_set(id, name.trim()).await?;
        Ok(repo.get_seasonal_set(id).await?)
    }
    .await;
    db_services::audit(repo, ctx, "seasonal.rename", target(id), result_of(&result)).await;
    result
}

pub async fn replace_rows<R: FullRepository + ?Sized>(
    repo: &R,
    id: SeasonalSetId,
    rows: &[SeasonalRow],
    ctx: &AuditContext,
) -> ServiceResult<SeasonalSet> {
    let result = async {
        ensure_can_update(repo, id).await?;
        repo.replace_seasonal_rows(id, rows).await?;
        Ok::<_, ServiceError>(repo.get_seasonal_set(id).await?)
    }
    .await;
    db_services::audit(repo, ctx, "seasonal.update", target(id), result_of(&result)).await;
    result
}

pub async fn delete<R: FullRepository + ?Sized>(
    repo: &R,
    id: SeasonalSetId,
    ctx: &AuditContext,
) -> ServiceResult<()> {
    let result = async {
        ensure_can_delete(repo, id).await?;
        repo.delete_seasonal_set(id).await?;
        Ok::<_, ServiceError>(())
    }
    .await;
    db_services::audit(repo, ctx, "seasonal.delete", target(id), result_of(&result)).await;
    result
}

/// Parse coefficient rows from a spreadsheet or CSV document.
pub fn parse_rows(file_name: &str, bytes: &[u8], search_rows: usize) -> IngestResult<Vec<SeasonalRow>> {
    let grid = read_grid(bytes, file_name)?;
    let coefficient_headers = coefficient_columns();
    let mut expected: Vec<&str> = vec![RPS_COLUMN, OPERATION_COLUMN];
    expected.extend(coefficient_headers.iter().map(String::as_str));

    let table = Table::locate(grid, &expected, search_rows, 0)?;
    if table.is_empty() {
        return Err(IngestError::EmptyImport(file_name.to_string()));
    }
    let rps_col = table.require(RPS_COLUMN)?;
    let op_col = table.require(OPERATION_COLUMN)?;
    let coefficient_cols = coefficient_headers
        .iter()
        .map(|h| table.require(h))
        .collect::<IngestResult<Vec<usize>>>()?;

    table
        .records()
        .map(|record| {
            let rps_cell = record.get(rps_col);
            let rps_short = rps_cell
                .as_string()
                .ok_or_else(|| IngestError::coercion(record.row_number, RPS_COLUMN, rps_cell.raw()))?;
            let op_cell = record.get(op_col);
            let type_op: OperationType = op_cell.raw().parse().map_err(|_| {
                IngestError::coercion(record.row_number, OPERATION_COLUMN, op_cell.raw())
            })?;
            let mut coefficients = [0.0; 12];
            for ((slot, col), header) in coefficients
                .iter_mut()
                .zip(&coefficient_cols)
                .zip(&coefficient_headers)
            {
                let cell = record.get(*col);
                *slot = cell.as_f64().ok_or_else(|| {
                    IngestError::coercion(record.row_number, header.as_str(), cell.raw())
                })?;
            }
            Ok(SeasonalRow {
                rps_short,
                type_op,
                coefficients,
            })
        })
        .collect()
}

/// Create a new set named `name` from an uploaded file.
pub async fn import<R: FullRepository + ?Sized>(
    repo: &R,
    name: &str,
    file: UploadedFile,
    search_rows: usize,
    ctx: &AuditContext,
) -> ServiceResult<SeasonalSet> {
    let file_name = file.file_name.clone();
    let result = async {
        let rows = tokio::task::spawn_blocking(move || {
            parse_rows(&file.file_name, &file.bytes, search_rows)
        })
        .await??;
        let set = create_inner(repo, name, &rows).await?;
        info!(
            "Imported seasonal set {} '{}' with {} rows from '{}'",
            set.id,
            set.name,
            set.rows.len(),
            file_name
        );
        Ok::<_, ServiceError>(set)
    }
    .await;
    db_services::audit(repo, ctx, "seasonal.import", file_name.clone(), result_of(&result)).await;
    result
}

/// CSV export with the import column layout.
pub fn render_csv(set: &SeasonalSet) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let mut header = vec![RPS_COLUMN.to_string(), OPERATION_COLUMN.to_string()];
    header.extend(coefficient_columns());
    writer.write_record(&header)?;
    for row in &set.rows {
        let mut record = vec![row.rps_short.clone(), row.type_op.as_str().to_string()];
        record.extend(row.coefficients.iter().map(f64::to_string));
        writer.write_record(&record)?;
    }
    writer.into_inner().map_err(|e| e.into_error().into())
}

pub async fn export<R: FullRepository + ?Sized>(
    repo: &R,
    id: SeasonalSetId,
) -> ServiceResult<Vec<u8>> {
    let set = repo.get_seasonal_set(id).await?;
    render_csv(&set).map_err(|e| ServiceError::Internal(format!("Failed to export seasonal set: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::pipeline::DEFAULT_HEADER_SEARCH_ROWS as DEFAULT_SEARCH_ROWS;

    const CSV: &str = "Коэффициенты сезонности\n\
        Род вагона;Тип операции;СК01;СК02;СК03;СК04;СК05;СК06;СК07;СК08;СК09;СК10;СК11;СК12\n\
        ПВ;Погрузка;1,1;1;1;1;1;1;0,9;1;1;1;1;1\n\
        ЦС;Выгрузка;1;1;1;1;1;1;1;1;1;1;1;1,2\n";

    #[test]
    fn test_parse_rows_after_title() {
        let rows = parse_rows("seasonal.csv", CSV.as_bytes(), DEFAULT_SEARCH_ROWS).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].rps_short, "ПВ");
        assert_eq!(rows[0].type_op, OperationType::Loading);
        assert_eq!(rows[0].coefficients[0], 1.1);
        assert_eq!(rows[0].coefficients[6], 0.9);
        assert_eq!(rows[1].coefficients[11], 1.2);
    }

    #[test]
    fn test_parse_rows_rejects_unknown_operation() {
        let csv = CSV.replace("Выгрузка", "Перестановка");
        let err = parse_rows("seasonal.csv", csv.as_bytes(), DEFAULT_SEARCH_ROWS).unwrap_err();
        assert!(matches!(err, IngestError::Coercion { row: 4, .. }));
    }

    #[test]
    fn test_export_reimports() {
        let rows = parse_rows("seasonal.csv", CSV.as_bytes(), DEFAULT_SEARCH_ROWS).unwrap();
        let set = SeasonalSet {
            id: SeasonalSetId::new(1),
            name: "base".into(),
            rows,
        };
        let bytes = render_csv(&set).unwrap();
        let again = parse_rows("export.csv", &bytes, DEFAULT_SEARCH_ROWS).unwrap();
        assert_eq!(again, set.rows);
    }
}
