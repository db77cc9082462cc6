//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for a Jira server and drive the full
//! list → fetch → transform → write → checkpoint cycle end-to-end.

use jira_harvest::config::{
    Config, HarvestConfig, OutputConfig, RemoteConfig, StateBackendKind, StateConfig,
    UserAgentConfig,
};
use jira_harvest::output::JsonlSink;
use jira_harvest::transform::OutputRecord;
use jira_harvest::{
    CollectionKey, CollectionOutcome, Cursor, ItemId, JiraClient, Orchestrator, ProgressStore,
};
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, dir: &Path, backend: StateBackendKind) -> Config {
    let state_file = match backend {
        StateBackendKind::Json => "state.json",
        StateBackendKind::Sqlite => "state.db",
    };

    Config {
        remote: RemoteConfig {
            base_url: base_url.to_string(),
            timeout_secs: 5,
            max_attempts: 5,
            base_delay_ms: 1,
            max_delay_ms: 5,
            rate_limit_delay_ms: 1,
            request_delay_ms: 0,
        },
        user_agent: UserAgentConfig {
            client_name: "TestHarvester".to_string(),
            client_version: "1.0.0".to_string(),
            contact_url: "https://example.com/contact".to_string(),
            contact_email: "test@example.com".to_string(),
        },
        harvest: HarvestConfig {
            projects: vec!["SPARK".to_string()],
            page_size: 2,
            batch_size: 2,
            failure_threshold: 5,
            jql: "project = {project} ORDER BY created ASC".to_string(),
        },
        state: StateConfig {
            path: dir.join(state_file).display().to_string(),
            backend,
        },
        output: OutputConfig {
            path: dir.join("dataset.jsonl").display().to_string(),
        },
    }
}

fn issue_body(key: &str) -> serde_json::Value {
    json!({
        "key": key,
        "fields": {
            "summary": format!("Summary of {}", key),
            "description": "Something is broken.",
            "status": {"name": "Open"},
            "issuetype": {"name": "Bug"},
            "priority": {"name": "Major"},
            "project": {"key": "SPARK", "name": "Spark"},
            "reporter": {"displayName": "Alice"},
            "created": "2024-01-15T10:30:00.000+0000",
            "labels": ["core"],
            "components": [{"name": "SQL"}]
        }
    })
}

async fn mount_project(server: &MockServer, key: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(format!("/project/{}", key)))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({"key": key, "name": "Spark"})))
        .mount(server)
        .await;
}

async fn mount_search_page(server: &MockServer, start_at: u64, keys: &[&str], total: u64) {
    let issues: Vec<_> = keys.iter().map(|k| json!({"key": k})).collect();
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("startAt", start_at.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "startAt": start_at,
            "maxResults": 2,
            "total": total,
            "issues": issues
        })))
        .mount(server)
        .await;
}

/// Mounts detail and comment endpoints that must each be hit exactly once
async fn mount_issue(server: &MockServer, key: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/issue/{}", key)))
        .respond_with(ResponseTemplate::new(200).set_body_json(issue_body(key)))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/issue/{}/comment", key)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "comments": [{
                "author": {"displayName": "Bob"},
                "body": format!("Comment on {}", key),
                "created": "2024-01-16T09:00:00.000+0000"
            }],
            "total": 1
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_spark(server: &MockServer) {
    mount_project(server, "SPARK", 200).await;
    mount_search_page(server, 0, &["SPARK-1", "SPARK-2"], 3).await;
    mount_search_page(server, 2, &["SPARK-3"], 3).await;
    mount_search_page(server, 3, &[], 3).await;
}

fn read_records(path: &str) -> Vec<OutputRecord> {
    std::fs::read_to_string(path)
        .expect("Failed to read output")
        .lines()
        .map(|line| serde_json::from_str(line).expect("Invalid output line"))
        .collect()
}

async fn run_harvest(config: &Config) -> jira_harvest::RunReport {
    let source = JiraClient::from_config(config).expect("Failed to build client");
    let sink = JsonlSink::open(&config.output.path).expect("Failed to open output");
    let store = ProgressStore::from_config(&config.state).expect("Failed to open state");

    let collections: Vec<CollectionKey> = config
        .harvest
        .projects
        .iter()
        .map(|p| CollectionKey::new(p.as_str()))
        .collect();

    let mut orchestrator = Orchestrator::new(source, sink, store, &config.harvest);
    orchestrator
        .run(&collections)
        .await
        .expect("Harvest failed")
}

#[tokio::test]
async fn test_full_harvest_single_project() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), StateBackendKind::Json);

    mount_spark(&server).await;
    for key in ["SPARK-1", "SPARK-2", "SPARK-3"] {
        mount_issue(&server, key).await;
    }

    let report = run_harvest(&config).await;

    assert!(report.is_success());
    assert_eq!(report.total_emitted(), 3);

    let records = read_records(&config.output.path);
    let keys: Vec<_> = records.iter().map(|r| r.issue_key.as_str()).collect();
    assert_eq!(keys, vec!["SPARK-1", "SPARK-2", "SPARK-3"]);

    let first = &records[0];
    assert_eq!(first.title, "Summary of SPARK-1");
    assert_eq!(first.status, "Open");
    assert_eq!(first.created.as_deref(), Some("2024-01-15 10:30:00 UTC"));
    assert_eq!(first.components, vec!["SQL"]);
    assert_eq!(first.comment_count, 1);
    assert_eq!(first.comments[0].author, "Bob");
    assert_eq!(first.metadata.collection, "SPARK");

    // persisted layout
    let state: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&config.state.path).unwrap()).unwrap();
    assert_eq!(state["version"], 1);
    assert_eq!(state["collections"]["SPARK"]["cursor"], 3);
    assert_eq!(
        state["collections"]["SPARK"]["processed"]
            .as_array()
            .unwrap()
            .len(),
        3
    );
    assert!(state["last_updated"].is_string());
}

#[tokio::test]
async fn test_second_run_fetches_nothing_again() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), StateBackendKind::Json);

    mount_spark(&server).await;
    for key in ["SPARK-1", "SPARK-2", "SPARK-3"] {
        mount_issue(&server, key).await;
    }

    let first = run_harvest(&config).await;
    let second = run_harvest(&config).await;

    assert_eq!(first.total_emitted(), 3);
    assert_eq!(second.total_emitted(), 0);
    assert!(second.is_success());
    assert_eq!(read_records(&config.output.path).len(), 3);
    // detail/comment mocks verify exactly one hit each when the server drops
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), StateBackendKind::Json);

    mount_spark(&server).await;
    Mock::given(method("GET"))
        .and(path("/issue/SPARK-2"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    for key in ["SPARK-1", "SPARK-2", "SPARK-3"] {
        mount_issue(&server, key).await;
    }

    let report = run_harvest(&config).await;

    assert!(report.is_success());
    assert_eq!(read_records(&config.output.path).len(), 3);
}

#[tokio::test]
async fn test_failed_item_is_recorded_and_retried_next_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), StateBackendKind::Json);

    mount_spark(&server).await;
    // SPARK-2 is unavailable for the whole first run
    Mock::given(method("GET"))
        .and(path("/issue/SPARK-2"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(5)
        .expect(5)
        .mount(&server)
        .await;
    for key in ["SPARK-1", "SPARK-2", "SPARK-3"] {
        mount_issue(&server, key).await;
    }

    let first = run_harvest(&config).await;
    let spark = CollectionKey::from("SPARK");
    assert_eq!(first.get(&spark).unwrap().outcome, CollectionOutcome::Done);
    assert_eq!(first.get(&spark).unwrap().failed, 1);
    {
        let store = ProgressStore::from_config(&config.state).unwrap();
        assert_eq!(store.failed_items(&spark), vec![ItemId::from("SPARK-2")]);
        assert_eq!(store.cursor(&spark), Cursor::new(3));
    }

    let second = run_harvest(&config).await;
    assert_eq!(second.total_emitted(), 1);

    let store = ProgressStore::from_config(&config.state).unwrap();
    assert!(store.failed_items(&spark).is_empty());
    assert_eq!(store.processed_count(&spark), 3);
    assert_eq!(read_records(&config.output.path).len(), 3);
}

#[tokio::test]
async fn test_still_failing_item_does_not_stop_new_issues() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), StateBackendKind::Json);

    mount_project(&server, "SPARK", 200).await;
    mount_search_page(&server, 0, &["SPARK-1", "SPARK-2"], 3).await;
    mount_search_page(&server, 2, &["SPARK-3"], 3).await;
    // SPARK-4 is created between the two runs
    mount_search_page(&server, 3, &["SPARK-4"], 4).await;

    // SPARK-2 stays down for both runs: five attempts each
    Mock::given(method("GET"))
        .and(path("/issue/SPARK-2"))
        .respond_with(ResponseTemplate::new(503))
        .expect(10)
        .mount(&server)
        .await;
    for key in ["SPARK-1", "SPARK-3", "SPARK-4"] {
        mount_issue(&server, key).await;
    }

    let first = run_harvest(&config).await;
    assert_eq!(first.total_emitted(), 2);

    let second = run_harvest(&config).await;
    assert!(second.is_success());
    assert_eq!(second.total_emitted(), 1);
    assert_eq!(second.total_failed(), 1);

    let spark = CollectionKey::from("SPARK");
    let store = ProgressStore::from_config(&config.state).unwrap();
    assert_eq!(store.cursor(&spark), Cursor::new(4));
    assert_eq!(store.failed_items(&spark), vec![ItemId::from("SPARK-2")]);

    let keys: Vec<_> = read_records(&config.output.path)
        .into_iter()
        .map(|r| r.issue_key)
        .collect();
    assert_eq!(keys, vec!["SPARK-1", "SPARK-3", "SPARK-4"]);
}

#[tokio::test]
async fn test_deleted_issue_is_skipped_for_good() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), StateBackendKind::Json);

    mount_spark(&server).await;
    Mock::given(method("GET"))
        .and(path("/issue/SPARK-2"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    for key in ["SPARK-1", "SPARK-3"] {
        mount_issue(&server, key).await;
    }

    let first = run_harvest(&config).await;
    let second = run_harvest(&config).await;

    assert!(first.is_success());
    assert_eq!(first.total_failed(), 1);
    assert_eq!(second.total_failed(), 0);

    let store = ProgressStore::from_config(&config.state).unwrap();
    assert!(store.failed_items(&CollectionKey::from("SPARK")).is_empty());
}

#[tokio::test]
async fn test_unknown_project_aborts_without_listing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), dir.path(), StateBackendKind::Json);
    config.harvest.projects = vec!["NOPE".to_string()];

    mount_project(&server, "NOPE", 404).await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let report = run_harvest(&config).await;

    assert!(report.any_aborted());
    assert!(!report.is_success());
}

#[tokio::test]
async fn test_sqlite_state_backend() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), dir.path(), StateBackendKind::Sqlite);

    mount_spark(&server).await;
    for key in ["SPARK-1", "SPARK-2", "SPARK-3"] {
        mount_issue(&server, key).await;
    }

    let report = run_harvest(&config).await;
    assert!(report.is_success());

    let spark = CollectionKey::from("SPARK");
    let store = ProgressStore::from_config(&config.state).unwrap();
    assert_eq!(store.cursor(&spark), Cursor::new(3));
    assert_eq!(store.processed_count(&spark), 3);
    assert!(store.is_processed(&spark, &ItemId::from("SPARK-3")));
}
