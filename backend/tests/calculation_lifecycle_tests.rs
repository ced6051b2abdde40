mod support;

use std::sync::Arc;

use support::{date, new_calc, seasonal_rows, seed_days, seeded_repository};
use tou_backend::api::{
    AuditContext, CalcFilters, CalcId, CalcStatus, CalcTouPatch, OperationType, ProgressLevel,
    SeasonalSetId, SourceSystem,
};
use tou_backend::db::repositories::LocalRepository;
use tou_backend::db::repository::{
    CalculationRepository, FactRepository, FullRepository, SeasonalRepository,
};
use tou_backend::services::{calc_controller, seasonal, EngineOptions, ErrorKind};

async fn seasonal_set(repo: &LocalRepository) -> SeasonalSetId {
    seasonal::create(repo, "base", &seasonal_rows(), &AuditContext::system())
        .await
        .unwrap()
        .id
}

async fn march_calculation(repo: &LocalRepository, set: SeasonalSetId) -> CalcId {
    let calc = new_calc("March", date(2023, 3, 1), date(2023, 3, 31), set);
    calc_controller::create(repo, &calc, &CalcFilters::default(), &AuditContext::new("ivanova"))
        .await
        .unwrap()
        .calc
        .id
}

#[tokio::test]
async fn test_create_requires_existing_seasonal_set() {
    let repo = seeded_repository().await;
    let calc = new_calc("orphan", date(2023, 3, 1), date(2023, 3, 31), SeasonalSetId::new(404));
    let err = calc_controller::create(&repo, &calc, &CalcFilters::default(), &AuditContext::system())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReferenceIntegrity);
    assert!(repo.list_calculations().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_start_rejected_until_range_is_covered() {
    let repo = Arc::new(seeded_repository().await);
    let set = seasonal_set(&repo).await;
    let id = march_calculation(&repo, set).await;

    seed_days(&repo, date(2023, 3, 1), date(2023, 3, 14)).await;
    seed_days(&repo, date(2023, 3, 16), date(2023, 3, 31)).await;

    let shared: Arc<dyn FullRepository> = repo.clone();
    let err = calc_controller::start(shared.clone(), id, EngineOptions::default(), &AuditContext::system())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Admissibility);
    assert!(err.to_string().contains("30 of 31 days"));
    assert_eq!(repo.get_calculation(id).await.unwrap().status, CalcStatus::New);

    seed_days(&repo, date(2023, 3, 15), date(2023, 3, 15)).await;
    let handle = calc_controller::start(shared, id, EngineOptions::default(), &AuditContext::system())
        .await
        .unwrap();
    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome.facts_read, 31);
    assert_eq!(repo.get_calculation(id).await.unwrap().status, CalcStatus::Done);
}

#[tokio::test]
async fn test_start_rejected_unless_new() {
    let repo = Arc::new(seeded_repository().await);
    let set = seasonal_set(&repo).await;
    let id = march_calculation(&repo, set).await;
    seed_days(&repo, date(2023, 3, 1), date(2023, 3, 31)).await;
    repo.force_status(id, CalcStatus::Done);

    let err = calc_controller::start(repo.clone(), id, EngineOptions::default(), &AuditContext::system())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Admissibility);
    assert_eq!(
        err.to_string(),
        "The attempt to calculate the TOU was rejected (status = DONE, but need NEW)"
    );
}

#[tokio::test]
async fn test_concurrent_starts_admit_exactly_one() {
    let repo = Arc::new(seeded_repository().await);
    let set = seasonal_set(&repo).await;
    let id = march_calculation(&repo, set).await;
    seed_days(&repo, date(2023, 3, 1), date(2023, 3, 31)).await;

    let attempts: Vec<_> = (0..8)
        .map(|i| {
            let shared: Arc<dyn FullRepository> = repo.clone();
            tokio::spawn(async move {
                let ctx = AuditContext::new(format!("user{}", i));
                calc_controller::start(shared, id, EngineOptions::default(), &ctx).await
            })
        })
        .collect();

    let mut admitted = Vec::new();
    let mut rejected = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(handle) => admitted.push(handle),
            Err(e) => {
                assert_eq!(e.kind(), ErrorKind::Admissibility);
                rejected += 1;
            }
        }
    }
    assert_eq!(admitted.len(), 1);
    assert_eq!(rejected, 7);

    for handle in admitted {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(repo.get_calculation(id).await.unwrap().status, CalcStatus::Done);
}

#[tokio::test]
async fn test_run_writes_report_and_progress_log() {
    let repo = Arc::new(seeded_repository().await);
    let set = seasonal_set(&repo).await;
    let id = march_calculation(&repo, set).await;
    seed_days(&repo, date(2023, 3, 1), date(2023, 3, 31)).await;

    let options = EngineOptions {
        fetch_chunk_size: 10,
        legacy_group_key: false,
    };
    let handle = calc_controller::start(repo.clone(), id, options, &AuditContext::new("ivanova"))
        .await
        .unwrap();
    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome.facts_read, 31);
    assert_eq!(outcome.records_kept, 31);
    assert_eq!(outcome.groups, 1);
    assert_eq!(outcome.report_rows, 1);
    assert_eq!(outcome.file_name, "report_tou_2023-03_2023-03.csv");

    let view = calc_controller::get(repo.as_ref(), id).await.unwrap();
    assert_eq!(view.calc.status, CalcStatus::Done);
    assert_eq!(view.seasonal_set_name.as_deref(), Some("base"));
    assert_eq!(view.log.first().map(|e| e.level), Some(ProgressLevel::Start));
    assert_eq!(view.log.first().map(|e| e.message.as_str()), Some("Start function \"calc_tou\""));
    assert_eq!(view.log.last().map(|e| e.level), Some(ProgressLevel::Finish));
    assert!(view
        .log
        .iter()
        .any(|e| e.message == "After aggregation - 1 rows, 14 cols."));
    assert!(view.log.iter().all(|e| e.username == "ivanova"));

    let report = calc_controller::report(repo.as_ref(), id).await.unwrap();
    assert_eq!(report.file_name, outcome.file_name);
    let text = String::from_utf8(report.bytes).unwrap();
    let mut lines = text.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("База,РОСКГ,"));
    assert!(header.contains("2028г"));
    assert!(header.contains("2028-12"));
    let row = lines.next().unwrap();
    assert!(row.starts_with(&format!("{}: March,", id)));
    assert!(lines.next().is_none());
}

#[tokio::test]
async fn test_failed_run_is_recorded_and_reset() {
    let repo = Arc::new(seeded_repository().await);
    let set = seasonal_set(&repo).await;
    let id = march_calculation(&repo, set).await;
    seed_days(&repo, date(2023, 3, 1), date(2023, 3, 31)).await;

    // Remove the set behind the service guard so the run cannot load it.
    assert!(repo.delete_seasonal_set(set).await.unwrap());
    assert!(repo.force_status(id, CalcStatus::InProcess));

    let err = calc_controller::execute(repo.as_ref(), id, EngineOptions::default(), &AuditContext::system())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReferenceIntegrity);

    let view = calc_controller::get(repo.as_ref(), id).await.unwrap();
    assert_eq!(view.calc.status, CalcStatus::Failed);
    let last = view.log.last().unwrap();
    assert_eq!(last.level, ProgressLevel::Finish);
    assert!(last.message.contains(&err.to_string()));
    let before_last = &view.log[view.log.len() - 2];
    assert_eq!(before_last.level, ProgressLevel::Error);

    let report = calc_controller::report(repo.as_ref(), id).await.unwrap_err();
    assert_eq!(report.kind(), ErrorKind::NotFound);

    let reset = calc_controller::reset(repo.as_ref(), id, &AuditContext::system())
        .await
        .unwrap();
    assert_eq!(reset.status, CalcStatus::New);

    let again = calc_controller::reset(repo.as_ref(), id, &AuditContext::system())
        .await
        .unwrap_err();
    assert_eq!(again.kind(), ErrorKind::Admissibility);
}

#[tokio::test]
async fn test_update_and_delete_refused_while_running() {
    let repo = seeded_repository().await;
    let set = seasonal_set(&repo).await;
    let id = march_calculation(&repo, set).await;
    repo.force_status(id, CalcStatus::InProcess);

    let patch = CalcTouPatch {
        name: Some("renamed".into()),
        ..Default::default()
    };
    let err = calc_controller::update(&repo, id, &patch, &AuditContext::system())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Admissibility);

    let err = calc_controller::delete(&repo, id, &AuditContext::system())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Admissibility);
}

#[tokio::test]
async fn test_update_replaces_supplied_filters_only() {
    let repo = seeded_repository().await;
    let set = seasonal_set(&repo).await;
    let calc = new_calc("filtered", date(2023, 3, 1), date(2023, 3, 31), set);
    let filters = CalcFilters {
        rps: vec!["ПВ".into()],
        operation_types: vec![OperationType::Loading],
        stations: vec!["100006".into()],
    };
    let id = calc_controller::create(&repo, &calc, &filters, &AuditContext::system())
        .await
        .unwrap()
        .calc
        .id;

    let patch = CalcTouPatch {
        amount_year_period: Some(3),
        operation_types: Some(OperationType::ALL.to_vec()),
        ..Default::default()
    };
    let spec = calc_controller::update(&repo, id, &patch, &AuditContext::system())
        .await
        .unwrap();
    assert_eq!(spec.calc.amount_year_period, 3);
    assert_eq!(spec.calc.name, "filtered");
    assert_eq!(spec.filters.operation_types, OperationType::ALL.to_vec());
    assert_eq!(spec.filters.rps, vec!["ПВ".to_string()]);
    assert_eq!(spec.filters.stations, vec!["100006".to_string()]);
}

#[tokio::test]
async fn test_copy_creates_new_child_calculation() {
    let repo = seeded_repository().await;
    let set = seasonal_set(&repo).await;
    let filters = CalcFilters {
        rps: vec!["ПВ".into()],
        ..Default::default()
    };
    let calc = new_calc("March", date(2023, 3, 1), date(2023, 3, 31), set);
    let id = calc_controller::create(&repo, &calc, &filters, &AuditContext::system())
        .await
        .unwrap()
        .calc
        .id;
    repo.force_status(id, CalcStatus::Done);

    let copy = calc_controller::copy(&repo, id, None, &AuditContext::new("petrov"))
        .await
        .unwrap();
    assert_ne!(copy.calc.id, id);
    assert_eq!(copy.calc.name, "March (copy)");
    assert_eq!(copy.calc.status, CalcStatus::New);
    assert_eq!(copy.calc.parent_id, Some(id));
    assert_eq!(copy.calc.author, "petrov");
    assert_eq!(copy.calc.file_id, None);
    assert_eq!(copy.filters, filters);

    let named = calc_controller::copy(&repo, id, Some("April".into()), &AuditContext::system())
        .await
        .unwrap();
    assert_eq!(named.calc.name, "April");
}

#[tokio::test]
async fn test_seasonal_set_guards() {
    let repo = seeded_repository().await;
    let ctx = AuditContext::system();
    let set = seasonal_set(&repo).await;
    let id = march_calculation(&repo, set).await;

    // Used only by a NEW calculation: editable, not deletable.
    seasonal::rename(&repo, set, "base v2", &ctx).await.unwrap();
    let err = seasonal::delete(&repo, set, &ctx).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Guard);
    assert!(err.to_string().contains("cannot be deleted (used in calc_tou)"));

    repo.force_status(id, CalcStatus::Done);
    let err = seasonal::replace_rows(&repo, set, &seasonal_rows(), &ctx)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Guard);
    assert!(err
        .to_string()
        .contains("cannot be updated (used in calc_tou with status != NEW)"));

    calc_controller::delete(&repo, id, &ctx).await.unwrap();
    seasonal::delete(&repo, set, &ctx).await.unwrap();
    assert!(seasonal::list(&repo).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_branch_filter_limits_extracted_facts() {
    let repo = Arc::new(seeded_repository().await);
    let set = seasonal_set(&repo).await;
    seed_days(&repo, date(2023, 3, 1), date(2023, 3, 31)).await;
    let mut other = support::fact(date(2023, 3, 5), "99999", 2.0);
    other.org_id = Some(12);
    repo.replace_facts(SourceSystem::Sap, None, &[other]).await.unwrap();

    let mut calc = new_calc("branch", date(2023, 3, 1), date(2023, 3, 31), set);
    calc.branch_id = Some(support::BRANCH);
    let id = calc_controller::create(repo.as_ref(), &calc, &CalcFilters::default(), &AuditContext::system())
        .await
        .unwrap()
        .calc
        .id;

    let outcome = calc_controller::start(repo.clone(), id, EngineOptions::default(), &AuditContext::system())
        .await
        .unwrap()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.facts_read, 31);
}
