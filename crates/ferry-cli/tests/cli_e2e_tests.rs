//! End-to-end tests for the ferry binary
//!
//! The server side is mocked with wiremock; `ferry id` runs offline.

use assert_cmd::Command;
use ferry_common::identity::{self, RunVersion};
use predicates::prelude::*;
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn ferry(server: &MockServer) -> Command {
    let mut cmd = Command::cargo_bin("ferry").unwrap();
    cmd.arg("--server-url").arg(server.uri());
    cmd
}

fn status_body(status: &str) -> serde_json::Value {
    serde_json::json!({
        "ingestion_id": "abc123",
        "file_id": "f00d",
        "source_path": "/data/products.json",
        "file_type": "json",
        "callback_url": "http://consumer:9000/callback",
        "chunking": {"mode": "records", "value": 500},
        "status": status,
        "chunks_sent": 4,
        "records_sent": 2000,
        "progress": {"last_chunk": 3, "total_records": 2000, "status": "COMPLETED"},
        "created_at": "2024-05-01T10:00:00Z",
        "updated_at": "2024-05-01T10:00:05Z"
    })
}

#[tokio::test]
async fn test_submit_prints_ingestion_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ingest"))
        .and(body_partial_json(serde_json::json!({
            "file_path": "/data/products.json",
            "callback_url": "http://consumer:9000/callback",
            "chunk_size_by_records": 500,
            "resume": true
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"status": "STARTED", "ingestion_id": "abc123"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    ferry(&server)
        .args([
            "submit",
            "--file",
            "/data/products.json",
            "--callback",
            "http://consumer:9000/callback",
            "--records",
            "500",
            "--resume",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("abc123"))
        .stdout(predicate::str::contains("ferry status abc123"));
}

#[tokio::test]
async fn test_submit_json_output() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ingest"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"status": "STARTED", "ingestion_id": "abc123"})),
        )
        .mount(&server)
        .await;

    let output = ferry(&server)
        .args(["--json", "submit", "-f", "/data/p.json", "-c", "http://c/cb", "--bytes", "4096"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["ingestion_id"], "abc123");
    assert_eq!(body["status"], "STARTED");
}

#[test]
fn test_submit_requires_exactly_one_bound() {
    let mut cmd = Command::cargo_bin("ferry").unwrap();
    cmd.args(["submit", "-f", "/data/p.json", "-c", "http://c/cb"])
        .assert()
        .failure()
        .code(2);

    let mut cmd = Command::cargo_bin("ferry").unwrap();
    cmd.args([
        "submit", "-f", "/data/p.json", "-c", "http://c/cb", "--records", "10", "--bytes", "10",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("cannot be used with"));
}

#[tokio::test]
async fn test_submit_surfaces_server_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ingest"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": {"message": "Source not found: /data/missing.json", "status": 404}
        })))
        .mount(&server)
        .await;

    ferry(&server)
        .args(["submit", "-f", "/data/missing.json", "-c", "http://c/cb", "--records", "10"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Source not found: /data/missing.json"));
}

#[tokio::test]
async fn test_status_shows_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/ingestions/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body("COMPLETED")))
        .mount(&server)
        .await;

    ferry(&server)
        .args(["status", "abc123"])
        .assert()
        .success()
        .stdout(predicate::str::contains("COMPLETED"))
        .stdout(predicate::str::contains("last chunk 3, 2000 records"))
        .stdout(predicate::str::contains("500 per chunk (records)"));
}

#[tokio::test]
async fn test_status_reports_last_error() {
    let server = MockServer::start().await;
    let mut body = status_body("ABORTED");
    body["progress"] = serde_json::Value::Null;
    body["last_error"] = serde_json::json!("chunk 0 failed after 3 attempts");

    Mock::given(method("GET"))
        .and(path("/api/ingestions/abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    ferry(&server)
        .args(["status", "abc123"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ABORTED"))
        .stdout(predicate::str::contains("no chunk acknowledged yet"))
        .stdout(predicate::str::contains("after 3 attempts"));
}

#[tokio::test]
async fn test_status_unknown_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/ingestions/nope"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "error": {"message": "Ingestion 'nope' not found", "status": 404}
        })))
        .mount(&server)
        .await;

    ferry(&server)
        .args(["status", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Ingestion 'nope' not found"));
}

#[tokio::test]
async fn test_health_ok() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "healthy",
            "database": "connected",
            "version": "0.1.0"
        })))
        .mount(&server)
        .await;

    ferry(&server)
        .arg("health")
        .assert()
        .success()
        .stdout(predicate::str::contains("Server healthy"))
        .stdout(predicate::str::contains("connected"));
}

#[tokio::test]
async fn test_health_unhealthy_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
            "status": "unhealthy",
            "database": "disconnected",
            "error": "pool timed out"
        })))
        .mount(&server)
        .await;

    ferry(&server)
        .arg("health")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("pool timed out"));
}

#[test]
fn test_health_unreachable_server() {
    let mut cmd = Command::cargo_bin("ferry").unwrap();
    cmd.args(["--server-url", "http://127.0.0.1:1", "health"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Network request failed"));
}

#[test]
fn test_id_matches_server_derivation() {
    let expected = identity::ingestion_id_for("/data/products.json", "json", &RunVersion::Resume);

    let mut cmd = Command::cargo_bin("ferry").unwrap();
    cmd.args(["id", "/data/products.json", "--resume"])
        .assert()
        .success()
        .stdout(predicate::str::contains(identity::file_id("/data/products.json", "json")))
        .stdout(predicate::str::contains(expected));
}

#[test]
fn test_id_json_without_version() {
    let mut cmd = Command::cargo_bin("ferry").unwrap();
    let output = cmd.args(["--json", "id", "/data/products.json"]).output().unwrap();

    assert!(output.status.success());
    let body: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["file_id"], identity::file_id("/data/products.json", "json"));
    assert!(body.get("ingestion_id").is_none());
}

#[test]
fn test_id_rejects_resume_with_version() {
    let mut cmd = Command::cargo_bin("ferry").unwrap();
    cmd.args(["id", "/data/p.json", "--resume", "--version", "123"])
        .assert()
        .failure()
        .code(2);
}
