mod support;

use support::{date, seeded_repository, BRANCH, SAP_CLIENT, STATION};
use tou_backend::api::{AuditContext, CoverageEntry, DateRange, FactQuery, SourceSystem};
use tou_backend::db::repository::{FactRepository, JournalRepository, ReferenceRepository};
use tou_backend::ingest::raw::{COGNOS_LAYOUT, SAP_LAYOUT};
use tou_backend::ingest::NormalizeOptions;
use tou_backend::services::{coverage, fact_import, ErrorKind, UploadedFile};

fn csv_document(headers: &[&str], rows: &[Vec<String>]) -> Vec<u8> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(headers).unwrap();
    for row in rows {
        writer.write_record(row).unwrap();
    }
    writer.into_inner().unwrap()
}

struct CognosRow<'a> {
    date: &'a str,
    client: &'a str,
    wagon: &'a str,
    rolling_stock: &'a str,
    cargo: &'a str,
    reported: &'a str,
    double: &'a str,
    next_acceptance: &'a str,
    arrival: &'a str,
    double_downtime: &'a str,
}

impl<'a> CognosRow<'a> {
    fn single(date: &'a str, wagon: &'a str) -> Self {
        Self {
            date,
            client: "77",
            wagon,
            rolling_stock: "Полувагон",
            cargo: "Уголь каменный",
            reported: "9",
            double: "нет",
            next_acceptance: "2023-01-03 00:00:00",
            arrival: "2023-01-01 00:00:00",
            double_downtime: "0",
        }
    }

    fn fields(&self) -> Vec<String> {
        [
            self.date,
            "10000",
            "Северная",
            "Южная",
            "Западная",
            self.client,
            "Выгрузка",
            self.wagon,
            self.rolling_stock,
            self.cargo,
            self.cargo,
            self.reported,
            self.double,
            self.next_acceptance,
            self.arrival,
            self.double_downtime,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

fn cognos_file(name: &str, rows: &[CognosRow<'_>]) -> UploadedFile {
    let rows: Vec<Vec<String>> = rows.iter().map(CognosRow::fields).collect();
    UploadedFile::new(name, csv_document(&COGNOS_LAYOUT.headers(), &rows))
}

fn sap_file(name: &str, days: &[&str], client: (&str, &str)) -> UploadedFile {
    let headers = SAP_LAYOUT.headers();
    let mut rows: Vec<Vec<String>> = days
        .iter()
        .enumerate()
        .map(|(i, day)| {
            let wagon = format!("{}", 70_000 + i);
            [
                *day, STATION, "Северная", "", "", client.0, client.1, "Погрузка", wagon.as_str(), "ПВ",
                "", "", "Уголь", "161005.0", "нет", "2.25", "0",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect()
        })
        .collect();
    let mut footer = vec![String::new(); headers.len()];
    footer[0] = "Итого".into();
    rows.push(footer);
    UploadedFile::new(name, csv_document(&headers, &rows))
}

#[tokio::test]
async fn test_cognos_import_derives_downtime() {
    let repo = seeded_repository().await;
    let double = CognosRow {
        reported: "1.5",
        double: "Да",
        next_acceptance: "2023-01-04 00:00:00",
        double_downtime: "4",
        ..CognosRow::single("2023-01-02", "1002")
    };
    let file = cognos_file(
        "cognos.csv",
        &[CognosRow::single("2023-01-01", "1001"), double],
    );

    let outcome = fact_import::import_file(
        &repo,
        SourceSystem::Cognos,
        file,
        true,
        NormalizeOptions::default(),
        &AuditContext::new("ivanova"),
    )
    .await
    .unwrap();
    assert_eq!(outcome.inserted, 2);

    let range = DateRange::new(date(2023, 1, 1), date(2023, 1, 31)).unwrap();
    let facts = repo
        .fetch_facts_page(&FactQuery::for_range(range), 0, 10)
        .await
        .unwrap();
    assert_eq!(facts.len(), 2);
    assert_eq!(facts[0].parking, 2.0);
    assert!((facts[1].parking - 1.125).abs() < 1e-9);
    assert_eq!(facts[0].st_code.as_deref(), Some(STATION));
    assert_eq!(facts[0].org_id, Some(BRANCH));
    assert_eq!(facts[0].client_sap_id, SAP_CLIENT);

    let audit = repo.list_audit(10).await.unwrap();
    assert!(audit.iter().any(|e| e.username == "ivanova" && e.succeeded));
}

#[tokio::test]
async fn test_cognos_import_drops_unresolved_rows_and_uses_cargo_fallback() {
    let repo = seeded_repository().await;
    let rows = [
        CognosRow {
            cargo: "Концентрат железорудный (гематит)",
            ..CognosRow::single("2023-01-01", "2001")
        },
        CognosRow {
            rolling_stock: "Цистерна",
            ..CognosRow::single("2023-01-01", "2002")
        },
        CognosRow {
            client: "99",
            ..CognosRow::single("2023-01-01", "2003")
        },
        CognosRow {
            cargo: "Груз неизвестный",
            ..CognosRow::single("2023-01-01", "2004")
        },
    ];

    let outcome = fact_import::import_file(
        &repo,
        SourceSystem::Cognos,
        cognos_file("mixed.csv", &rows),
        true,
        NormalizeOptions::default(),
        &AuditContext::system(),
    )
    .await
    .unwrap();

    assert_eq!(outcome.stats.rows_read, 4);
    assert_eq!(outcome.stats.joins.dropped_rolling_stock, 1);
    assert_eq!(outcome.stats.joins.dropped_client, 1);
    assert_eq!(outcome.stats.joins.cargo_fallback, 1);
    assert_eq!(outcome.stats.joins.unresolved_cargo, 1);
    assert_eq!(outcome.inserted, 2);

    let range = DateRange::new(date(2023, 1, 1), date(2023, 1, 1)).unwrap();
    let facts = repo
        .fetch_facts_page(&FactQuery::for_range(range), 0, 10)
        .await
        .unwrap();
    let cargo_of = |wagon: &str| {
        facts
            .iter()
            .find(|f| f.wagon_num == wagon)
            .map(|f| f.cargo_group_num)
    };
    assert_eq!(cargo_of("2001"), Some(Some(7)));
    assert_eq!(cargo_of("2004"), Some(None));
}

#[tokio::test]
async fn test_reimport_with_overwrite_is_idempotent() {
    let repo = seeded_repository().await;
    let days = ["01.03.2023", "02.03.2023", "03.03.2023"];
    let ctx = AuditContext::system();

    let first = fact_import::import_file(
        &repo,
        SourceSystem::Sap,
        sap_file("sap.csv", &days, ("9002", "АО Лютик")),
        true,
        NormalizeOptions::default(),
        &ctx,
    )
    .await
    .unwrap();
    assert_eq!(first.inserted, 3);
    assert_eq!(first.deleted, 0);
    assert_eq!(first.clients.map(|c| c.inserted), Some(1));

    let second = fact_import::import_file(
        &repo,
        SourceSystem::Sap,
        sap_file("sap.csv", &days, ("9002", "АО Лютик-2")),
        true,
        NormalizeOptions::default(),
        &ctx,
    )
    .await
    .unwrap();
    assert_eq!(second.deleted, 3);
    assert_eq!(second.inserted, 3);
    assert_eq!(second.clients.map(|c| c.updated), Some(1));
    assert_eq!(repo.fact_count(), 3);

    let snapshot = repo.reference_snapshot().await.unwrap();
    let renamed = snapshot.clients.iter().find(|c| c.sap_id == "9002").unwrap();
    assert_eq!(renamed.name, "АО Лютик-2");
}

#[tokio::test]
async fn test_import_without_overwrite_appends() {
    let repo = seeded_repository().await;
    let days = ["01.03.2023", "02.03.2023"];
    for _ in 0..2 {
        fact_import::import_file(
            &repo,
            SourceSystem::Sap,
            sap_file("sap.csv", &days, ("9002", "АО Лютик")),
            false,
            NormalizeOptions::default(),
            &AuditContext::system(),
        )
        .await
        .unwrap();
    }
    assert_eq!(repo.fact_count(), 4);
}

#[tokio::test]
async fn test_unrecognized_file_is_format_error() {
    let repo = seeded_repository().await;
    let file = UploadedFile::new("notes.csv", b"a;b\n1;2\n".to_vec());
    let err = fact_import::import_file(
        &repo,
        SourceSystem::Cognos,
        file,
        true,
        NormalizeOptions::default(),
        &AuditContext::system(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Format);
    assert_eq!(repo.fact_count(), 0);
}

#[tokio::test]
async fn test_import_files_rebuilds_coverage() {
    let repo = seeded_repository().await;
    let march: Vec<String> = (1..=31).map(|d| format!("{:02}.03.2023", d)).collect();
    let april: Vec<String> = (1..=30)
        .filter(|d| *d != 17)
        .map(|d| format!("{:02}.04.2023", d))
        .collect();
    let march_refs: Vec<&str> = march.iter().map(String::as_str).collect();
    let april_refs: Vec<&str> = april.iter().map(String::as_str).collect();

    let outcomes = fact_import::import_files(
        &repo,
        SourceSystem::Sap,
        vec![
            sap_file("march.csv", &march_refs, ("9002", "АО Лютик")),
            sap_file("april.csv", &april_refs, ("9002", "АО Лютик")),
        ],
        true,
        NormalizeOptions::default(),
        &AuditContext::system(),
    )
    .await
    .unwrap();
    assert_eq!(outcomes.len(), 2);

    let months = coverage::list(&repo, Some(2023), Some(2023)).await.unwrap();
    assert_eq!(months, vec![CoverageEntry { year: 2023, month: 3 }]);
    assert!(coverage::list(&repo, Some(2024), None).await.unwrap().is_empty());
}

#[cfg(feature = "http-server")]
#[tokio::test]
async fn test_import_job_reports_each_file_and_coverage() {
    use std::sync::Arc;
    use tou_backend::db::repository::FullRepository;
    use tou_backend::services::import_processor::process_import_job;
    use tou_backend::services::job_tracker::{JobKind, JobStatus, JobTracker};

    let repo = Arc::new(seeded_repository().await);
    let shared: Arc<dyn FullRepository> = repo.clone();
    let tracker = JobTracker::new();
    let job_id = tracker.create_job(JobKind::FactImport(SourceSystem::Sap), 2);

    let march: Vec<String> = (1..=31).map(|d| format!("{:02}.03.2023", d)).collect();
    let march_refs: Vec<&str> = march.iter().map(String::as_str).collect();
    let files = vec![
        sap_file("march.csv", &march_refs, ("9002", "АО Лютик")),
        sap_file("april.csv", &["01.04.2023", "02.04.2023"], ("9002", "АО Лютик")),
    ];

    let outcomes = process_import_job(
        job_id.clone(),
        tracker.clone(),
        shared,
        SourceSystem::Sap,
        files,
        true,
        NormalizeOptions::default(),
        AuditContext::new("petrov"),
    )
    .await
    .unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(repo.fact_count(), 33);

    let job = tracker.get_job(&job_id).unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.files_done, 2);
    let messages: Vec<&str> = job.logs.iter().map(|l| l.message.as_str()).collect();
    assert!(messages.contains(&"Processing 'march.csv'..."));
    assert!(messages.contains(&"Processing 'april.csv'..."));
    assert!(messages.contains(&"✓ Coverage rebuilt: 1 complete months"));

    let months = coverage::list(repo.as_ref(), Some(2023), None).await.unwrap();
    assert_eq!(months, vec![CoverageEntry { year: 2023, month: 3 }]);
}
