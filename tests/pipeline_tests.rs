mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;

use etl_batch::{
    exit_code, run, Cell, ClientSettings, ColumnTransform, DestinationTable, ErrorKind, EtlResult,
    FindQuery, JobClient, LoadReport, MemoryStore, PipelineStages, QueryParams, RowStore,
    RunOutcome, StagingPipeline, StoreLoader, Table, TemplateStore, TimeWindow, UpsertStyle,
    WarehousePipeline, WriteDisposition,
};

use common::{unique_name, MockWarehouse, RecordingAlert};

const DAILY_STATS_SQL: &str =
    "SELECT * FROM events WHERE hour >= '{{ start }}' AND hour < '{{ end }}'";

fn daily_templates() -> TemplateStore {
    let mut templates = TemplateStore::new();
    templates.register("daily_stats", DAILY_STATS_SQL);
    templates
}

fn daily_window() -> TimeWindow {
    TimeWindow::new(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
    )
    .unwrap()
}

fn fast_client(warehouse: MockWarehouse) -> JobClient<MockWarehouse> {
    JobClient::new(warehouse).with_poll_interval(Duration::from_millis(1))
}

fn wire_row(cells: &[Option<&str>]) -> Vec<Option<String>> {
    cells.iter().map(|c| c.map(str::to_string)).collect()
}

#[tokio::test]
async fn test_end_to_end_insert_run() {
    let warehouse = MockWarehouse::returning(
        &[("count", "INTEGER"), ("seen_at", "TIMESTAMP")],
        vec![wire_row(&[Some("5"), Some("1700000000")])],
    );
    let store = MemoryStore::new();
    let collection = unique_name("hourly_stats");

    let pipeline = WarehousePipeline::new(
        "HourlyStats",
        "daily_stats",
        daily_templates(),
        fast_client(warehouse.clone()),
        StoreLoader::insert(store.clone(), collection.clone()),
    );

    let outcome = run(&pipeline, &daily_window().params()).await.unwrap();
    match outcome {
        RunOutcome::Completed(LoadReport::Inserted { count, ids }) => {
            assert_eq!(count, 1);
            assert_eq!(ids.len(), 1);
        }
        other => panic!("expected an insert outcome, got {:?}", other),
    }

    // The rendered query carries space-separated UTC datetimes, not ISO-8601
    let submitted = warehouse.submitted_jobs();
    assert_eq!(submitted.len(), 1);
    let (query, destination) = &submitted[0];
    assert!(query.contains("2024-01-01 00:00:00"));
    assert!(query.contains("2024-01-02 00:00:00"));
    assert!(!query.contains("2024-01-01T"));
    assert!(destination.is_none());

    // Timestamps reach the store as UTC instants in document form
    let docs = store.find(&collection, FindQuery::all()).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].get("count"), Some(&json!(5)));
    assert_eq!(docs[0].get("seen_at"), Some(&json!("2023-11-14T22:13:20Z")));
}

#[tokio::test]
async fn test_table_rows_match_reported_total() {
    let warehouse = MockWarehouse::returning(
        &[("site", "STRING"), ("clicks", "INTEGER")],
        vec![
            wire_row(&[Some("a"), Some("1")]),
            wire_row(&[Some("b"), Some("2")]),
            wire_row(&[None, Some("3")]),
        ],
    );
    let store = MemoryStore::new();
    let collection = unique_name("click_stats");

    let pipeline = WarehousePipeline::new(
        "ClickStats",
        "daily_stats",
        daily_templates(),
        fast_client(warehouse),
        StoreLoader::insert(store.clone(), collection.clone()),
    );

    let outcome = run(&pipeline, &daily_window().params()).await.unwrap();
    match outcome {
        RunOutcome::Completed(LoadReport::Inserted { count, ids }) => {
            assert_eq!(count, 3);
            assert_eq!(ids.len(), 3);
        }
        other => panic!("expected an insert outcome, got {:?}", other),
    }
    assert_eq!(store.len(&collection).await, 3);
}

/// Stage spy: extraction yields no data, later stages count invocations.
struct CountingPipeline {
    transform_calls: AtomicU32,
    load_calls: AtomicU32,
}

impl PipelineStages for CountingPipeline {
    fn name(&self) -> &str {
        "Counting"
    }

    async fn extract(&self, _params: &QueryParams) -> EtlResult<Option<Table>> {
        Ok(None)
    }

    fn transform(&self, table: Table) -> EtlResult<Table> {
        self.transform_calls.fetch_add(1, Ordering::SeqCst);
        Ok(table)
    }

    async fn load(&self, _table: Table) -> EtlResult<Option<LoadReport>> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}

#[tokio::test]
async fn test_no_data_short_circuits_later_stages() {
    let pipeline = CountingPipeline {
        transform_calls: AtomicU32::new(0),
        load_calls: AtomicU32::new(0),
    };
    let outcome = run(&pipeline, &QueryParams::new()).await.unwrap();
    assert!(outcome.is_no_data());
    assert_eq!(pipeline.transform_calls.load(Ordering::SeqCst), 0);
    assert_eq!(pipeline.load_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_zero_row_result_is_no_data() {
    let store = MemoryStore::new();
    let collection = unique_name("empty_stats");
    let pipeline = WarehousePipeline::new(
        "EmptyStats",
        "daily_stats",
        daily_templates(),
        fast_client(MockWarehouse::empty()),
        StoreLoader::insert(store.clone(), collection.clone()),
    );

    let result = run(&pipeline, &daily_window().params()).await;
    assert_eq!(result.as_ref().unwrap(), &RunOutcome::NoData);
    assert_eq!(exit_code(&result), 0);
    assert_eq!(store.len(&collection).await, 0);
}

#[tokio::test]
async fn test_job_error_aborts_run_and_alerts() {
    let alert = RecordingAlert::new();
    let client = JobClient::with_alerts(MockWarehouse::failing_with("access denied"), alert.clone())
        .with_poll_interval(Duration::from_millis(1));
    let pipeline = WarehousePipeline::new(
        "FailingStats",
        "daily_stats",
        daily_templates(),
        client,
        StoreLoader::insert(MemoryStore::new(), unique_name("failed_stats")),
    );

    let result = run(&pipeline, &daily_window().params()).await;
    let err = result.as_ref().unwrap_err();
    assert_eq!(err.kind, ErrorKind::RemoteJob);
    assert_eq!(exit_code(&result), 1);

    let messages = alert.messages();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("job-42"));
    assert!(messages[0].contains("access denied"));
}

#[tokio::test]
async fn test_upsert_run_is_idempotent() {
    let warehouse = MockWarehouse::returning(
        &[
            ("date", "TIMESTAMP"),
            ("site", "STRING"),
            ("clicks", "INTEGER"),
        ],
        vec![wire_row(&[Some("1704067200"), Some("a"), Some("7")])],
    );
    let store = MemoryStore::new();
    let collection = unique_name("daily_stats");
    let loader = StoreLoader::upsert(
        store.clone(),
        collection.clone(),
        vec!["date".to_string(), "site".to_string()],
        UpsertStyle::Replace,
    )
    .unwrap();
    let pipeline = WarehousePipeline::new(
        "DailyStats",
        "daily_stats",
        daily_templates(),
        fast_client(warehouse),
        loader,
    );
    let params = daily_window().params();

    let first = run(&pipeline, &params).await.unwrap();
    assert_eq!(
        first,
        RunOutcome::Completed(LoadReport::Upserted {
            updated: 0,
            inserted: 1
        })
    );

    // Second identical run matches every row and inserts nothing new
    let second = run(&pipeline, &params).await.unwrap();
    assert_eq!(
        second,
        RunOutcome::Completed(LoadReport::Upserted {
            updated: 1,
            inserted: 0
        })
    );
    assert_eq!(store.len(&collection).await, 1);
}

#[tokio::test]
async fn test_declared_keyword_split_reaches_store() {
    let warehouse = MockWarehouse::returning(
        &[("campaign", "STRING"), ("keywords", "STRING")],
        vec![wire_row(&[Some("spring"), Some("shoes,running,sale")])],
    );
    let store = MemoryStore::new();
    let collection = unique_name("keyword_stats");
    let pipeline = WarehousePipeline::new(
        "KeywordStats",
        "daily_stats",
        daily_templates(),
        fast_client(warehouse),
        StoreLoader::insert(store.clone(), collection.clone()),
    )
    .with_transform("keywords", ColumnTransform::SplitText { delimiter: ',' });

    run(&pipeline, &daily_window().params()).await.unwrap();

    let docs = store.find(&collection, FindQuery::all()).await.unwrap();
    assert_eq!(
        docs[0].get("keywords"),
        Some(&json!(["shoes", "running", "sale"]))
    );
}

#[tokio::test]
async fn test_staging_pipeline_materializes_without_fetching_rows() {
    let warehouse = MockWarehouse::empty();
    let destination =
        DestinationTable::new("ad_events", "imp_matched").with_write(WriteDisposition::Append);
    let pipeline = StagingPipeline::new(
        "ImpMatched",
        "daily_stats",
        daily_templates(),
        fast_client(warehouse.clone()),
        destination,
    );

    let outcome = run(&pipeline, &daily_window().params()).await.unwrap();
    assert!(outcome.is_no_data());

    let submitted = warehouse.submitted_jobs();
    assert_eq!(submitted.len(), 1);
    let dest = submitted[0].1.as_ref().expect("destination should be set");
    assert_eq!(dest.dataset, "ad_events");
    assert_eq!(dest.table, "imp_matched");
    // Results land in the destination table; the client never reads them back
    assert_eq!(warehouse.result_fetches(), 0);
}

#[tokio::test]
async fn test_client_settings_resolve_from_environment() {
    common::load_env();
    let settings = ClientSettings::from_env().unwrap();
    let _client = JobClient::new(MockWarehouse::empty()).with_settings(&settings);
    assert!(settings.poll_interval() >= Duration::from_secs(1));
}

#[test]
fn test_window_rendering_matches_template_expectations() {
    let params = daily_window().params();
    let query = daily_templates().render("daily_stats", &params).unwrap();
    assert!(query.contains("hour >= '2024-01-01 00:00:00'"));
    assert!(query.contains("hour < '2024-01-02 00:00:00'"));

    // Same parameters, same rendering
    let again = daily_templates().render("daily_stats", &params).unwrap();
    assert_eq!(query, again);
}

#[test]
fn test_inverted_window_is_rejected_before_any_remote_call() {
    let result = TimeWindow::new(
        Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    );
    assert_eq!(result.unwrap_err().kind, ErrorKind::InvalidParams);
}

#[tokio::test]
async fn test_load_of_timestamp_only_cells() {
    // A declared schema of one TIMESTAMP column decodes to the exact instant
    let warehouse = MockWarehouse::returning(
        &[("seen_at", "TIMESTAMP")],
        vec![wire_row(&[Some("1700000000")])],
    );
    let store = MemoryStore::new();
    let collection = unique_name("instants");
    let pipeline = WarehousePipeline::new(
        "Instants",
        "daily_stats",
        daily_templates(),
        fast_client(warehouse),
        StoreLoader::insert(store.clone(), collection.clone()),
    );
    run(&pipeline, &daily_window().params()).await.unwrap();

    let expected = Cell::Timestamp(Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap());
    let docs = store.find(&collection, FindQuery::all()).await.unwrap();
    assert_eq!(docs[0].get("seen_at"), Some(&expected.to_json()));
}
