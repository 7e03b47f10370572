//! bks-runtime
//!
//! One synchronization run: connect the session, execute the requested
//! stages strictly in sequence, release the session. Connecting is the only
//! fatal step; every later failure is confined to its stage and counted in
//! the [`RunSummary`].

use bks_config::{Stage, SyncConfig};
use bks_reconcile::{DocumentPublisher, QueryFilter, RecordStore};
use bks_schemas::SessionConnector;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

mod report;
mod stages;

pub use report::{RunError, RunSummary, StageOutcome, StageReport};
pub use stages::{publish_account_summary, sync_positions, sync_trades};

/// A record store plus the scope its index is built over.
#[derive(Clone)]
pub struct StoreTarget<'a> {
    pub store: &'a dyn RecordStore,
    pub filter: QueryFilter,
}

impl<'a> StoreTarget<'a> {
    pub fn new(store: &'a dyn RecordStore, filter: QueryFilter) -> Self {
        Self { store, filter }
    }
}

impl std::fmt::Debug for StoreTarget<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreTarget")
            .field("store", &self.store.name())
            .field("filter", &self.filter)
            .finish()
    }
}

/// Where each stage writes. A stage requested without a target is aborted.
#[derive(Default, Clone)]
pub struct SyncTargets<'a> {
    pub positions: Option<StoreTarget<'a>>,
    pub trades: Option<StoreTarget<'a>>,
    pub account_summary: Option<&'a dyn DocumentPublisher>,
}

/// Run `stages` in order against one session from `connector`.
pub async fn run(
    connector: &dyn SessionConnector,
    targets: &SyncTargets<'_>,
    config: &SyncConfig,
    stages: &[Stage],
) -> Result<RunSummary, RunError> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();

    let session = connector.connect().await.map_err(|e| {
        warn!(%run_id, error = %e, "session connect failed; run aborted before any write");
        RunError::Connect(e)
    })?;
    info!(%run_id, session = session.name(), account = %config.account, ?stages, "run started");

    let mut reports = Vec::with_capacity(stages.len());
    for &stage in stages {
        let now = Utc::now();
        let report = match stage {
            Stage::Positions => match &targets.positions {
                Some(target) => sync_positions(session.as_ref(), target, config, now).await,
                None => StageReport::aborted(stage, 0, "no positions store configured"),
            },
            Stage::Trades => match &targets.trades {
                Some(target) => sync_trades(session.as_ref(), target, config).await,
                None => StageReport::aborted(stage, 0, "no trades store configured"),
            },
            Stage::AccountSummary => match targets.account_summary {
                Some(publisher) => {
                    publish_account_summary(session.as_ref(), publisher, config, now).await
                }
                None => StageReport::aborted(stage, 0, "no account summary page configured"),
            },
        };
        info!(%run_id, stage = %stage, failures = report.failures(), "stage finished");
        reports.push(report);
    }

    session.disconnect().await;

    let summary = RunSummary {
        run_id,
        account: config.account.clone(),
        session: session.name().to_string(),
        started_at,
        finished_at: Utc::now(),
        stages: reports,
    };
    info!(%run_id, failures = summary.failures(), "{summary}");
    Ok(summary)
}
