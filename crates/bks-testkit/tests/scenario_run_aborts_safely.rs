//! Fatal and stage-level aborts never write.

use bks_config::{load_layered_yaml_from_strings, Stage, SyncConfig};
use bks_reconcile::{QueryFilter, POSITION_KEY_FIELD};
use bks_runtime::{run, RunError, StageOutcome, StoreTarget, SyncTargets};
use bks_schemas::SessionError;
use bks_testkit::{
    position, FailingConnector, InMemoryStore, RecordingPublisher, ScriptedConnector,
    ScriptedSession, StoreCounters,
};

fn config() -> anyhow::Result<SyncConfig> {
    load_layered_yaml_from_strings(&[r#"
account: "U1"
notion:
  positions_database: "db-positions"
  account_summary_page: "page-1"
"#])?
    .sync_config()
}

fn filter() -> QueryFilter {
    QueryFilter {
        collection: "db-positions".to_string(),
        key_field: POSITION_KEY_FIELD.to_string(),
        page_size: 100,
    }
}

#[tokio::test]
async fn connect_failure_is_fatal_and_touches_no_store() -> anyhow::Result<()> {
    let cfg = config()?;
    let store = InMemoryStore::new();
    let publisher = RecordingPublisher::new();
    let targets = SyncTargets {
        positions: Some(StoreTarget::new(&store, filter())),
        account_summary: Some(&publisher),
        ..Default::default()
    };

    let err = run(&FailingConnector, &targets, &cfg, &Stage::ALL)
        .await
        .unwrap_err();

    assert!(matches!(err, RunError::Connect(SessionError::NotConnected(_))));
    assert_eq!(store.counters(), StoreCounters::default());
    assert!(publisher.published().is_empty());
    Ok(())
}

#[tokio::test]
async fn partial_index_aborts_the_stage_without_writes() -> anyhow::Result<()> {
    let cfg = config()?;
    let store = InMemoryStore::new();
    store.seed_keys("db-positions", POSITION_KEY_FIELD, "STK-OLD", 150);
    store.fail_query_on_page(1);
    let publisher = RecordingPublisher::new();

    let session = ScriptedSession::new()
        .with_position(position("U1", "SPY", 30, 400))
        .with_account_value("NetLiquidation", "1");
    let connector = ScriptedConnector::new(session.clone());
    let targets = SyncTargets {
        positions: Some(StoreTarget::new(&store, filter())),
        account_summary: Some(&publisher),
        ..Default::default()
    };

    let summary = run(
        &connector,
        &targets,
        &cfg,
        &[Stage::Positions, Stage::AccountSummary],
    )
    .await?;

    match summary.stage(Stage::Positions).map(|s| &s.outcome) {
        Some(StageOutcome::Aborted(reason)) => {
            assert!(reason.contains("page 1"), "{reason}")
        }
        other => panic!("positions stage should abort, got {other:?}"),
    }
    let counters = store.counters();
    assert_eq!((counters.creates, counters.updates), (0, 0));
    assert_eq!(store.len("db-positions"), 150);

    assert_eq!(publisher.published().len(), 1);
    assert_eq!(summary.to_string(), "completed with 1 failures");
    assert_eq!(session.calls().disconnects, 1);
    Ok(())
}

#[tokio::test]
async fn stage_without_target_is_reported_not_fatal() -> anyhow::Result<()> {
    let cfg = config()?;
    let connector = ScriptedConnector::new(ScriptedSession::new());

    let summary = run(&connector, &SyncTargets::default(), &cfg, &[Stage::Trades]).await?;

    assert_eq!(summary.failures(), 1);
    Ok(())
}
