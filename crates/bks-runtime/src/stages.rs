//! The three stages of a run. Each one reads from the session, enriches,
//! and writes to its target; none of them returns an error. Anything that
//! stops a stage early becomes `StageOutcome::Aborted` and is logged.

use bks_config::{Stage, SyncConfig};
use bks_portfolio::{aggregate_fills, estimate_margin, format_account_summary, value_positions};
use bks_reconcile::{
    build_index, position_record, synchronize, trade_record, DocumentPublisher, SyncRecord,
    WritePolicy,
};
use bks_schemas::{MarginUsage, PricingMethod, RawFill, Session};
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::report::{StageOutcome, StageReport};
use crate::StoreTarget;

/// Value every position, optionally estimate margin, and upsert one record per position.
pub async fn sync_positions(
    session: &dyn Session,
    target: &StoreTarget<'_>,
    config: &SyncConfig,
    now: DateTime<Utc>,
) -> StageReport {
    let stage = Stage::Positions;
    let positions = match session.positions(&config.account).await {
        Ok(p) => p,
        Err(e) => {
            error!(stage = %stage, error = %e, "positions request failed");
            return StageReport::aborted(stage, 0, format!("positions request failed: {e}"));
        }
    };

    let settings = &config.positions;
    let valued = value_positions(
        session,
        &positions,
        settings.price_window,
        &settings.multipliers(),
    )
    .await;
    let cost_basis = valued
        .iter()
        .filter(|v| v.method == PricingMethod::CostBasis)
        .count();
    let unpriced = valued
        .iter()
        .filter(|v| v.method == PricingMethod::Failed)
        .count();

    let mut margins: Vec<Option<MarginUsage>> = Vec::with_capacity(valued.len());
    if settings.estimate_margin {
        for v in &valued {
            margins.push(estimate_margin(session, &v.position, now).await.usage().cloned());
        }
    } else {
        margins.resize(valued.len(), None);
    }

    let records: Vec<SyncRecord> = valued
        .iter()
        .zip(&margins)
        .map(|(v, m)| position_record(v, m.as_ref(), &target.filter.key_field, now))
        .collect();
    info!(
        positions = records.len(),
        cost_basis,
        unpriced,
        margin_estimates = margins.iter().filter(|m| m.is_some()).count(),
        "positions enriched"
    );

    write_stage(stage, target, &records, WritePolicy::Upsert).await
}

/// Aggregate every fill of the session into trade records and append the new ones.
pub async fn sync_trades(
    session: &dyn Session,
    target: &StoreTarget<'_>,
    config: &SyncConfig,
) -> StageReport {
    let stage = Stage::Trades;
    let trades = match session.trades().await {
        Ok(t) => t,
        Err(e) => {
            error!(stage = %stage, error = %e, "trades request failed");
            return StageReport::aborted(stage, 0, format!("trades request failed: {e}"));
        }
    };

    let fills: Vec<RawFill> = trades.into_iter().flat_map(|t| t.fills).collect();
    let outcome = aggregate_fills(&fills, config.trades.group_by, &config.trades.sec_types);
    info!(
        fills = fills.len(),
        records = outcome.records.len(),
        filtered = outcome.filtered_fills,
        duplicates = outcome.duplicate_fills,
        dropped_groups = outcome.dropped_groups,
        "fills aggregated"
    );

    let records: Vec<SyncRecord> = outcome.records.iter().map(trade_record).collect();
    write_stage(stage, target, &records, WritePolicy::AppendOnly).await
}

/// Format the account summary and overwrite the published document.
pub async fn publish_account_summary(
    session: &dyn Session,
    publisher: &dyn DocumentPublisher,
    config: &SyncConfig,
    now: DateTime<Utc>,
) -> StageReport {
    let stage = Stage::AccountSummary;
    let values = match session.account_values(&config.account).await {
        Ok(v) => v,
        Err(e) => {
            error!(stage = %stage, error = %e, "account values request failed");
            return StageReport::aborted(stage, 0, format!("account values request failed: {e}"));
        }
    };
    if values.is_empty() {
        warn!(account = %config.account, "no account values; summary shows N/A");
    }

    let text = format_account_summary(&values, &config.account, now);
    match publisher.publish(&text).await {
        Ok(()) => {
            info!(publisher = publisher.name(), "account summary published");
            StageReport {
                stage,
                records: 0,
                outcome: StageOutcome::Published,
            }
        }
        Err(e) => {
            error!(publisher = publisher.name(), error = %e, "account summary publish failed");
            StageReport::aborted(stage, 0, format!("publish failed: {e}"))
        }
    }
}

/// Build the identity index, then write. A partial index aborts the stage
/// without any write.
async fn write_stage(
    stage: Stage,
    target: &StoreTarget<'_>,
    records: &[SyncRecord],
    policy: WritePolicy,
) -> StageReport {
    let store = target.store;
    let mut index = match build_index(store, &target.filter).await {
        Ok(index) => index,
        Err(e) => {
            error!(
                stage = %stage,
                store = store.name(),
                partial_keys = e.partial.len(),
                error = %e,
                "identity index incomplete; stage aborted"
            );
            return StageReport::aborted(stage, records.len(), e.to_string());
        }
    };
    if !index.duplicates().is_empty() {
        warn!(
            stage = %stage,
            store = store.name(),
            duplicates = index.duplicates().len(),
            "store holds several records per key; first one is kept"
        );
    }

    let report = synchronize(store, &target.filter.collection, records, &mut index, policy).await;
    info!(
        stage = %stage,
        store = store.name(),
        pages = index.pages_fetched(),
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        failed = report.failed,
        "stage synchronized"
    );
    StageReport {
        stage,
        records: records.len(),
        outcome: StageOutcome::Synced(report),
    }
}
