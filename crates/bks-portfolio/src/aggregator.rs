//! Fill aggregation.
//!
//! Folds per-execution fills into one [`TradeRecord`] per aggregation key:
//! summed quantity and commission, volume-weighted average price, and the
//! execution id / timestamp of the first fill seen for the key.
//!
//! Output order follows the first appearance of each key in the input, so the
//! same fill stream always yields the same records in the same order.

use std::collections::{BTreeMap, BTreeSet};

use bks_schemas::{average_micros, RawFill, SecType, Side, TradeRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How fills are grouped into trades.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    /// One trade per (broker order, symbol, side).
    #[default]
    Order,
    /// One trade per (symbol, side) across the whole input.
    SymbolSide,
}

/// Grouping key. `order_id` is `None` under [`GroupBy::SymbolSide`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AggregationKey {
    pub order_id: Option<String>,
    pub symbol: String,
    pub side: Side,
}

impl AggregationKey {
    fn for_fill(fill: &RawFill, group_by: GroupBy) -> Self {
        Self {
            order_id: match group_by {
                GroupBy::Order => Some(fill.order_id.clone()),
                GroupBy::SymbolSide => None,
            },
            symbol: fill.instrument.symbol.clone(),
            side: fill.side,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AggregationOutcome {
    pub records: Vec<TradeRecord>,
    /// Fills skipped because their instrument class is not aggregated.
    pub filtered_fills: usize,
    /// Fills skipped because their execution id was already consumed.
    pub duplicate_fills: usize,
    /// Groups whose summed quantity was not positive.
    pub dropped_groups: usize,
}

struct Running {
    record_id: String,
    order_id: String,
    ts_utc: DateTime<Utc>,
    qty: i64,
    notional_micros: i128,
    commission_micros: i64,
}

/// Aggregate `fills` into trade records.
///
/// Only fills whose instrument class is listed in `sec_types` are considered.
/// A group whose total quantity is zero (or negative) is dropped instead of
/// being averaged.
pub fn aggregate_fills(
    fills: &[RawFill],
    group_by: GroupBy,
    sec_types: &[SecType],
) -> AggregationOutcome {
    let mut outcome = AggregationOutcome::default();
    let mut order: Vec<AggregationKey> = Vec::new();
    let mut groups: BTreeMap<AggregationKey, Running> = BTreeMap::new();
    let mut seen_exec_ids: BTreeSet<&str> = BTreeSet::new();

    for fill in fills {
        if !sec_types.contains(&fill.instrument.sec_type) {
            outcome.filtered_fills += 1;
            continue;
        }
        if !seen_exec_ids.insert(fill.exec_id.as_str()) {
            debug!(exec_id = %fill.exec_id, "duplicate fill skipped");
            outcome.duplicate_fills += 1;
            continue;
        }

        let key = AggregationKey::for_fill(fill, group_by);
        let running = groups.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            Running {
                record_id: fill.exec_id.clone(),
                order_id: fill.order_id.clone(),
                ts_utc: fill.ts_utc,
                qty: 0,
                notional_micros: 0,
                commission_micros: 0,
            }
        });

        running.qty = running.qty.saturating_add(fill.qty);
        running.notional_micros += fill.price_micros as i128 * fill.qty as i128;
        running.commission_micros = running
            .commission_micros
            .saturating_add(fill.commission_micros.unwrap_or(0));
    }

    for key in order {
        let Some(running) = groups.remove(&key) else {
            continue;
        };
        if running.qty <= 0 {
            debug!(
                symbol = %key.symbol,
                side = key.side.as_str(),
                qty = running.qty,
                "dropping trade group without positive quantity"
            );
            outcome.dropped_groups += 1;
            continue;
        }
        let avg_price_micros = match average_micros(running.notional_micros, running.qty) {
            Ok(px) => px,
            Err(err) => {
                warn!(symbol = %key.symbol, error = %err, "dropping trade group");
                outcome.dropped_groups += 1;
                continue;
            }
        };
        outcome.records.push(TradeRecord {
            record_id: running.record_id,
            order_id: running.order_id,
            symbol: key.symbol,
            side: key.side,
            qty: running.qty,
            avg_price_micros,
            commission_micros: running.commission_micros,
            ts_utc: running.ts_utc,
        });
    }

    outcome
}
