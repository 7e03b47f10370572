//! bks-portfolio
//!
//! Enrichment of brokerage state before synchronization:
//! - fill aggregation into canonical trade records (pure)
//! - market valuation with cost-basis fallback and contract multipliers
//! - what-if margin estimation
//! - account-summary formatting
//!
//! Valuation and margin talk to the brokerage only through
//! [`bks_schemas::Session`]; neither ever propagates a session error.

mod aggregator;
mod margin;
mod summary;
mod valuation;

pub use aggregator::{aggregate_fills, AggregationKey, AggregationOutcome, GroupBy};
pub use margin::{estimate_margin, simulated_order_for, MarginOutcome, UnavailableReason};
pub use summary::{format_account_summary, format_value, SUMMARY_FIELDS};
pub use valuation::{value_position, value_positions, MultiplierTable};
