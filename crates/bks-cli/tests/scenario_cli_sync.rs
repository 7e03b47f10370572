use assert_cmd::prelude::*;
use httpmock::prelude::*;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

const TOKEN_VAR: &str = "BKS_CLI_TEST_NOTION_TOKEN";

const CAPTURE: &str = r#"{
    "positions": [
        { "account": "U1", "contract": { "symbol": "SPY", "con_id": 756733, "currency": "USD", "exchange": "SMART" },
          "position": 30, "avg_cost": 400 }
    ],
    "prices": [ { "contract": { "symbol": "SPY" }, "price": 510 } ]
}"#;

fn write_fixture(dir: &TempDir, notion_base: &str) -> (String, String) {
    let config = dir.path().join("base.yaml");
    fs::write(
        &config,
        format!(
            r#"account: "U1"
stages: {{ positions: true, trades: false, account_summary: false }}
notion:
  base_url: "{notion_base}"
  token_env: "{TOKEN_VAR}"
  positions_database: "db-positions"
"#
        ),
    )
    .unwrap();
    let session = dir.path().join("session.json");
    fs::write(&session, CAPTURE).unwrap();
    (
        config.to_string_lossy().to_string(),
        session.to_string_lossy().to_string(),
    )
}

#[test]
fn config_hash_prints_hash_and_canonical_json() {
    let dir = TempDir::new().unwrap();
    let (config, _) = write_fixture(&dir, "http://127.0.0.1:9");

    Command::cargo_bin("bks")
        .unwrap()
        .args(["config-hash", config.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::is_match("config_hash=[0-9a-f]{64}").unwrap())
        .stdout(predicate::str::contains("\"positions_database\":\"db-positions\""));
}

#[test]
fn sync_positions_creates_missing_record() {
    let server = MockServer::start();
    let query = server.mock(|when, then| {
        when.method(POST).path("/v1/databases/db-positions/query");
        then.status(200)
            .json_body(json!({ "results": [], "has_more": false, "next_cursor": null }));
    });
    let create = server.mock(|when, then| {
        when.method(POST)
            .path("/v1/pages")
            .body_contains("STK-SPY-USD");
        then.status(200).json_body(json!({ "id": "page-1", "properties": {} }));
    });

    let dir = TempDir::new().unwrap();
    let (config, session) = write_fixture(&dir, &server.base_url());

    Command::cargo_bin("bks")
        .unwrap()
        .env(TOKEN_VAR, "test-token")
        .args(["sync", "--config", config.as_str(), "--session", session.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "stage=positions records=1 created=1 updated=0 skipped=0 failed=0",
        ))
        .stdout(predicate::str::contains("completed with 0 failures"));

    query.assert();
    create.assert();
}

#[test]
fn sync_without_session_fails_before_any_store_call() {
    let server = MockServer::start();
    let any = server.mock(|when, then| {
        when.path_contains("/v1/");
        then.status(500);
    });

    let dir = TempDir::new().unwrap();
    let (config, _) = write_fixture(&dir, &server.base_url());
    let missing = dir.path().join("missing.json");

    Command::cargo_bin("bks")
        .unwrap()
        .env(TOKEN_VAR, "test-token")
        .args([
            "sync",
            "--config",
            config.as_str(),
            "--session",
            missing.to_string_lossy().as_ref(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("session connect failed"));

    any.assert_hits(0);
}

#[test]
fn sync_refuses_to_start_without_stage_secret() {
    let dir = TempDir::new().unwrap();
    let (config, session) = write_fixture(&dir, "http://127.0.0.1:9");

    Command::cargo_bin("bks")
        .unwrap()
        .env_remove(TOKEN_VAR)
        .args(["sync", "--config", config.as_str(), "--session", session.as_str()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("SECRETS_MISSING stage=positions"));
}
