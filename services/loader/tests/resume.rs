mod common;

use std::sync::Arc;

use common::{cases_for, config, write_file, write_year};
use loader::store::RunStatus;
use loader::{Loader, LoaderConfig, MemoryStore, Store, YearSelection, YearState};

// =============================================================================
// RESUMABILITY
// =============================================================================

#[tokio::test]
async fn only_years_not_yet_loaded_are_processed() {
    let dir = tempfile::tempdir().unwrap();
    for year in 2015..=2018 {
        write_year(dir.path(), year, &cases_for(year, 3));
    }
    let store = Arc::new(MemoryStore::new());

    let first = Loader::new(store.clone(), config(dir.path()))
        .run(YearSelection::Specific(vec![2015, 2016, 2017]))
        .await
        .unwrap();
    assert_eq!(first.done_years(), vec![2015, 2016, 2017]);
    let before = first.counts.unwrap().applications_by_year;

    let second = Loader::new(store.clone(), config(dir.path()))
        .run(YearSelection::Specific((2015..=2018).collect()))
        .await
        .unwrap();

    assert_eq!(second.already_loaded, vec![2015, 2016, 2017]);
    assert_eq!(second.outcomes.len(), 1);
    assert_eq!(second.outcomes[0].year, 2018);
    assert_eq!(second.outcomes[0].state, YearState::Done);

    let after = second.counts.unwrap().applications_by_year;
    for year in 2015..=2017 {
        assert_eq!(after[&year], before[&year]);
    }
    assert_eq!(after[&2018], 3);
}

#[tokio::test]
async fn cases_received_early_do_not_mark_the_prior_year_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let prior = cases_for(2020, 3);
    write_year(dir.path(), 2020, &prior);
    let mut current = cases_for(2021, 2);
    current[0].received = "2020-09-15".into();
    write_year(dir.path(), 2021, &current);
    let store = Arc::new(MemoryStore::new());

    Loader::new(store.clone(), config(dir.path()))
        .run(YearSelection::Specific(vec![2021]))
        .await
        .unwrap();
    let early = store.application(&current[0].case_number).await.unwrap();
    assert_eq!(early.fiscal_year, Some(2020));

    let summary = Loader::new(store.clone(), config(dir.path()))
        .run(YearSelection::Specific(vec![2020, 2021]))
        .await
        .unwrap();

    assert_eq!(summary.already_loaded, vec![2021]);
    assert_eq!(summary.done_years(), vec![2020]);
    for case in &prior {
        assert!(store.application(&case.case_number).await.is_some());
    }
}

#[tokio::test]
async fn interrupted_year_is_loaded_again() {
    let dir = tempfile::tempdir().unwrap();
    let cases = cases_for(2020, 3);
    write_year(dir.path(), 2020, &cases[..1]);
    let store = Arc::new(MemoryStore::new());

    Loader::new(store.clone(), config(dir.path()))
        .run(YearSelection::Specific(vec![2020]))
        .await
        .unwrap();

    // A later attempt died after committing part of the year.
    write_year(dir.path(), 2020, &cases);
    store.start_run(2020, serde_json::json!({})).await.unwrap();
    assert_eq!(store.table_counts().await.unwrap().applications, 1);

    let summary = Loader::new(store.clone(), config(dir.path()))
        .run(YearSelection::Specific(vec![2020]))
        .await
        .unwrap();

    assert!(summary.already_loaded.is_empty());
    assert_eq!(summary.done_years(), vec![2020]);
    assert_eq!(summary.counts.unwrap().applications, 3);
}

#[tokio::test]
async fn all_mode_skips_loaded_years_unless_forced() {
    let dir = tempfile::tempdir().unwrap();
    write_year(dir.path(), 2016, &cases_for(2016, 2));
    write_year(dir.path(), 2017, &cases_for(2017, 2));
    let store = Arc::new(MemoryStore::new());

    let first = Loader::new(store.clone(), config(dir.path()))
        .run(YearSelection::All)
        .await
        .unwrap();
    assert_eq!(first.done_years(), vec![2016, 2017]);

    let again = Loader::new(store.clone(), config(dir.path()))
        .run(YearSelection::All)
        .await
        .unwrap();
    assert!(again.outcomes.is_empty());
    assert_eq!(again.already_loaded, vec![2016, 2017]);

    let forced = LoaderConfig {
        force: true,
        ..config(dir.path())
    };
    let reload = Loader::new(store.clone(), forced)
        .run(YearSelection::All)
        .await
        .unwrap();
    assert_eq!(reload.done_years(), vec![2016, 2017]);
    assert_eq!(reload.counts.unwrap().applications, 4);
}

// =============================================================================
// YEAR FAILURES
// =============================================================================

#[tokio::test]
async fn year_without_files_fails_and_the_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    write_year(dir.path(), 2020, &cases_for(2020, 2));
    let store = Arc::new(MemoryStore::new());

    let summary = Loader::new(store.clone(), config(dir.path()))
        .run(YearSelection::Specific(vec![2019, 2020]))
        .await
        .unwrap();

    assert_eq!(summary.failed_years(), vec![2019]);
    assert_eq!(summary.done_years(), vec![2020]);
    let failed = &summary.outcomes[0];
    assert_eq!(failed.failed_at, Some(YearState::Pending));
    assert!(failed.error.as_deref().unwrap().contains("no source files"));
    assert!(summary.render().contains("no source files"));
}

#[tokio::test]
async fn unreadable_file_fails_its_year_before_any_write() {
    let dir = tempfile::tempdir().unwrap();
    write_year(dir.path(), 2021, &cases_for(2021, 2));
    write_file(dir.path(), "LCA_Disclosure_Data_FY2021_Q2.xlsx", "not a workbook");
    let store = Arc::new(MemoryStore::new());

    let summary = Loader::new(store.clone(), config(dir.path()))
        .run(YearSelection::Specific(vec![2021]))
        .await
        .unwrap();

    assert_eq!(summary.failed_years(), vec![2021]);
    assert_eq!(summary.outcomes[0].failed_at, Some(YearState::FilesDiscovered));
    let counts = summary.counts.unwrap();
    assert_eq!(counts.applications, 0);
    assert_eq!(counts.employers, 0);
}

#[tokio::test]
async fn missing_data_directory_fails_requested_years() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());

    let summary = Loader::new(store, config(&dir.path().join("absent")))
        .run(YearSelection::Specific(vec![2020]))
        .await
        .unwrap();

    assert_eq!(summary.failed_years(), vec![2020]);
}

// =============================================================================
// VIEWS AND AUDIT
// =============================================================================

#[tokio::test]
async fn views_refresh_only_after_a_finished_year() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let refreshing = LoaderConfig {
        refresh_views: true,
        ..config(dir.path())
    };

    let nothing_done = Loader::new(store.clone(), refreshing.clone())
        .run(YearSelection::Specific(vec![2020]))
        .await
        .unwrap();
    assert!(!nothing_done.views_refreshed);
    assert_eq!(store.view_refreshes().await, 0);

    write_year(dir.path(), 2020, &cases_for(2020, 1));
    let loaded = Loader::new(store.clone(), refreshing)
        .run(YearSelection::Specific(vec![2020]))
        .await
        .unwrap();
    assert!(loaded.views_refreshed);
    assert_eq!(store.view_refreshes().await, 1);
}

#[tokio::test]
async fn each_year_attempt_is_audited() {
    let dir = tempfile::tempdir().unwrap();
    write_year(dir.path(), 2020, &cases_for(2020, 2));
    let store = Arc::new(MemoryStore::new());

    Loader::new(store.clone(), config(dir.path()))
        .run(YearSelection::Specific(vec![2019, 2020]))
        .await
        .unwrap();

    let runs = store.runs().await;
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].fiscal_year, 2019);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].error.is_some());
    assert_eq!(runs[1].fiscal_year, 2020);
    assert_eq!(runs[1].status, RunStatus::Done);
    assert_eq!(runs[1].detail["loaded"], 2);
    assert_eq!(runs[1].detail["files"].as_array().unwrap().len(), 1);
}
