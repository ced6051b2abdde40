//! Fact Normalizer entry point: Read → Clean → Enrich → Derive → Shape.
//!
//! The Replace step needs the repository and lives in
//! `services::fact_import`; everything here is synchronous and CPU-bound so
//! callers run it on the blocking pool.

use log::info;
use serde::Serialize;

use super::clean::{clean_row, MISSING_CLIENT_ID};
use super::derive::downtime_for;
use super::error::IngestResult;
use super::raw::{extract_rows, ColumnLayout};
use super::resolver::{enrich, JoinStats, ReferenceIndex};
use super::shape::{date_span, dedup, to_fact};
use super::sheet::{read_grid, Table};
use crate::api::{CanonicalFact, DateRange, SourceSystem};
use crate::db::calculate_checksum;

/// Default header search window.
pub const DEFAULT_HEADER_SEARCH_ROWS: usize = 20;

#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    pub header_search_rows: usize,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            header_search_rows: DEFAULT_HEADER_SEARCH_ROWS,
        }
    }
}

/// Row counters of one normalized file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeStats {
    pub rows_read: usize,
    #[serde(flatten)]
    pub joins: JoinStats,
    pub duplicates_removed: usize,
}

/// Canonical facts produced from one uploaded file, ready for replacement.
#[derive(Debug, Clone)]
pub struct NormalizedImport {
    pub source: SourceSystem,
    pub file_name: String,
    /// SHA-256 of the uploaded bytes
    pub checksum: String,
    pub facts: Vec<CanonicalFact>,
    /// [min(date), max(date)] of `facts`; `None` when every row was dropped
    pub range: Option<DateRange>,
    pub stats: NormalizeStats,
    /// (SAP id, display name) pairs seen in a SAP file, first name per id
    pub sap_clients: Vec<(String, String)>,
}

/// Normalize one uploaded file into canonical facts.
pub fn normalize(
    source: SourceSystem,
    file_name: &str,
    bytes: &[u8],
    index: &ReferenceIndex,
    options: &NormalizeOptions,
) -> IngestResult<NormalizedImport> {
    let layout = ColumnLayout::for_source(source);

    // Read
    let grid = read_grid(bytes, file_name)?;
    let table = Table::locate(
        grid,
        &layout.headers(),
        options.header_search_rows,
        layout.skip_footer,
    )?;
    let raw_rows = extract_rows(&table, layout)?;
    let rows_read = raw_rows.len();
    info!("{}: read {} rows from '{}'", source, rows_read, file_name);

    // Clean
    let cleaned = raw_rows
        .iter()
        .map(|raw| clean_row(raw, layout))
        .collect::<IngestResult<Vec<_>>>()?;

    // Enrich
    let (enriched, joins) = enrich(cleaned, source, index);
    let sap_clients = match source {
        SourceSystem::Sap => collect_sap_clients(&enriched),
        SourceSystem::Cognos => Vec::new(),
    };

    // Derive + Shape
    let facts: Vec<CanonicalFact> = enriched
        .into_iter()
        .map(|row| {
            let parking = downtime_for(source, &row.cleaned);
            to_fact(row, source, parking)
        })
        .collect();
    let (facts, duplicates_removed) = dedup(facts);
    let range = date_span(&facts);

    info!(
        "{}: {} canonical facts from '{}' ({} duplicates removed, range {})",
        source,
        facts.len(),
        file_name,
        duplicates_removed,
        range.map(|r| r.to_string()).unwrap_or_else(|| "empty".into())
    );

    Ok(NormalizedImport {
        source,
        file_name: file_name.to_string(),
        checksum: calculate_checksum(bytes),
        facts,
        range,
        stats: NormalizeStats {
            rows_read,
            joins,
            duplicates_removed,
        },
        sap_clients,
    })
}

fn collect_sap_clients(rows: &[super::resolver::EnrichedRow]) -> Vec<(String, String)> {
    let mut seen = std::collections::HashSet::new();
    rows.iter()
        .filter(|row| row.client_sap_id != MISSING_CLIENT_ID)
        .filter_map(|row| {
            let name = row.cleaned.client_name.clone()?;
            seen.insert(row.client_sap_id.clone())
                .then(|| (row.client_sap_id.clone(), name))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        ClientMapping, FreightRecord, OperationType, ReferenceData, RollingStockModel,
        StationRecord,
    };
    use crate::ingest::raw::{COGNOS_LAYOUT, SAP_LAYOUT};
    use crate::ingest::IngestError;

    fn reference() -> ReferenceIndex {
        ReferenceIndex::build(&ReferenceData {
            stations: vec![StationRecord {
                code: "100006".into(),
                legacy_code: Some("10000".into()),
                name: "Северная".into(),
                org_id: Some(11),
            }],
            rolling_stock: vec![RollingStockModel {
                name: "Полувагон".into(),
                short_name: "ПВ".into(),
            }],
            freight: vec![FreightRecord {
                etsng_code: "161005".into(),
                name: "уголь каменный".into(),
                group_num: 1,
            }],
            clients: vec![ClientMapping {
                cognos_id: Some("77".into()),
                sap_id: "9001".into(),
                name: "ООО Ромашка".into(),
            }],
            ..Default::default()
        })
    }

    fn csv_document(headers: &[&str], rows: &[Vec<&str>]) -> Vec<u8> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(headers).unwrap();
        for row in rows {
            writer.write_record(row).unwrap();
        }
        writer.into_inner().unwrap()
    }

    fn cognos_row<'a>(date: &'a str, wagon: &'a str, double: &'a str) -> Vec<&'a str> {
        vec![
            date,
            "10000",
            "Северная",
            "Южная",
            "Западная",
            "77",
            "Выгрузка",
            wagon,
            "Полувагон",
            "Уголь каменный",
            "Кокс",
            "1.5",
            double,
            "2023-01-04 00:00:00",
            "2023-01-01 00:00:00",
            "4",
        ]
    }

    #[test]
    fn test_normalize_cognos_csv() {
        let bytes = csv_document(
            &COGNOS_LAYOUT.headers(),
            &[
                cognos_row("2023-01-01", "1001", "нет"),
                cognos_row("2023-01-02", "1002", "да"),
                cognos_row("2023-01-02", "1002", "да"),
            ],
        );
        let result = normalize(
            SourceSystem::Cognos,
            "cognos.csv",
            &bytes,
            &reference(),
            &NormalizeOptions::default(),
        )
        .unwrap();

        assert_eq!(result.stats.rows_read, 3);
        assert_eq!(result.stats.duplicates_removed, 1);
        assert_eq!(result.facts.len(), 2);
        assert_eq!(result.facts[0].parking, 3.0);
        assert!((result.facts[1].parking - 1.125).abs() < 1e-9);
        assert_eq!(result.facts[0].st_code.as_deref(), Some("100006"));
        assert_eq!(result.facts[0].org_id, Some(11));
        assert_eq!(result.facts[0].client_sap_id, "9001");
        assert_eq!(result.facts[0].type_op, OperationType::Unloading);
        assert_eq!(result.facts[0].cargo_group_num, Some(1));
        assert_eq!(result.range.map(|r| r.days()), Some(2));
        assert!(result.sap_clients.is_empty());
        assert_eq!(result.checksum.len(), 64);
    }

    #[test]
    fn test_normalize_sap_skips_footer_and_collects_clients() {
        let headers = SAP_LAYOUT.headers();
        let row = |wagon: &'static str| {
            vec![
                "05.03.2023", "100006", "Северная", "", "", "9002", "АО Лютик", "Погрузка",
                wagon, "ПВ", "", "", "Уголь", "161005.0", "нет", "2.25", "0",
            ]
        };
        let mut footer = vec![""; headers.len()];
        footer[0] = "Итого";
        let mut document = vec!["Выгрузка из SAP".to_string()];
        let body = String::from_utf8(csv_document(&headers, &[row("1"), row("2"), footer]))
            .unwrap();
        document.push(body);
        let bytes = document.join("\n").into_bytes();

        let result = normalize(
            SourceSystem::Sap,
            "sap.csv",
            &bytes,
            &reference(),
            &NormalizeOptions::default(),
        )
        .unwrap();

        assert_eq!(result.stats.rows_read, 2);
        assert_eq!(result.facts.len(), 2);
        assert_eq!(result.facts[0].parking, 2.25);
        assert_eq!(result.facts[0].cargo_group_num, Some(1));
        assert_eq!(result.facts[0].st_code_from.as_deref(), Some("100006"));
        assert_eq!(
            result.sap_clients,
            vec![("9002".to_string(), "АО Лютик".to_string())]
        );
    }

    #[test]
    fn test_normalize_rejects_wrong_format() {
        let bytes = csv_document(&["Совсем", "другой"], &[vec!["1", "2"]]);
        let err = normalize(
            SourceSystem::Cognos,
            "other.csv",
            &bytes,
            &reference(),
            &NormalizeOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, IngestError::HeaderNotFound { .. }));
    }
}
