//! Brokerage session boundary.
//!
//! The engine never talks to a brokerage directly; it consumes a [`Session`]
//! handed in by the orchestrator. Every call returns either a value or a
//! categorized [`SessionError`]; retries, if any, live inside the
//! implementation and are invisible here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{AccountValue, Instrument, Position, RawFill, Side};

/// Window of the short-interval price sample requested for valuation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceWindow {
    /// How far back to look for a sample.
    pub lookback_secs: u32,
    /// Sample (bar) size.
    pub bar_secs: u32,
}

impl Default for PriceWindow {
    fn default() -> Self {
        Self {
            lookback_secs: 86_400,
            bar_secs: 60,
        }
    }
}

/// Incremental margin deltas reported by the risk engine for a what-if order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginImpact {
    pub init_margin_delta_micros: i64,
    pub maint_margin_delta_micros: i64,
}

/// One order as the session reports it, with its fills.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTrade {
    pub order_id: String,
    pub instrument: Instrument,
    pub side: Side,
    pub fills: Vec<RawFill>,
}

/// Failure categories for session calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Network or timeout failure.
    Transport(String),
    /// The brokerage rejected the request.
    Api { code: Option<i64>, message: String },
    /// A payload could not be parsed into typed records.
    Decode(String),
    /// No session could be established (fatal for a run).
    NotConnected(String),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Transport(msg) => write!(f, "session transport error: {msg}"),
            SessionError::Api {
                code: Some(c),
                message,
            } => write!(f, "session api error code={c}: {message}"),
            SessionError::Api {
                code: None,
                message,
            } => write!(f, "session api error: {message}"),
            SessionError::Decode(msg) => write!(f, "session decode error: {msg}"),
            SessionError::NotConnected(msg) => write!(f, "session not connected: {msg}"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Brokerage capabilities consumed by the engine.
///
/// Object safe; the runtime holds a `Box<dyn Session>` for the length of one
/// run and issues calls strictly one at a time.
#[async_trait]
pub trait Session: Send + Sync {
    /// Short identifier used in logs (e.g. `"paper"`).
    fn name(&self) -> &'static str;

    async fn positions(&self, account: &str) -> Result<Vec<Position>, SessionError>;

    async fn trades(&self) -> Result<Vec<SessionTrade>, SessionError>;

    /// Most recent traded/mid price in micros, or `None` when no sample exists.
    async fn latest_price(
        &self,
        instrument: &Instrument,
        window: PriceWindow,
    ) -> Result<Option<i64>, SessionError>;

    /// Submit a non-executing what-if order. `None` means the risk engine
    /// produced no result.
    async fn simulate_order(
        &self,
        instrument: &Instrument,
        side: Side,
        qty: i64,
    ) -> Result<Option<MarginImpact>, SessionError>;

    /// Resolve missing identifying fields.
    async fn qualify(&self, instrument: &Instrument) -> Result<Instrument, SessionError>;

    /// Account values for the summary stage; sessions without them report none.
    async fn account_values(&self, account: &str) -> Result<Vec<AccountValue>, SessionError> {
        let _ = account;
        Ok(Vec::new())
    }

    /// Release the session. Called once by the orchestrator at the end of a run.
    async fn disconnect(&self) {}
}

/// Establishes sessions. A connect failure is the only fatal error of a run.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Session>, SessionError>;
}
