//! Snapshot-backed brokerage session.
//!
//! `PaperSession` answers every [`Session`] call from a normalized
//! [`SessionCapture`]; nothing is computed or fetched. Design decisions:
//! - `latest_price` returns the captured sample whatever the window asks for.
//! - `simulate_order` requires a qualified instrument (as a live risk engine
//!   does) and returns `None` when the capture has no matching what-if entry.
//! - `qualify` fills missing con id / exchange / currency from the capture's
//!   `contracts` table; an unknown contract is an API error.
//! - After `disconnect` every call fails with `NotConnected`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bks_schemas::{
    AccountValue, Instrument, MarginImpact, Position, PriceWindow, Session, SessionConnector,
    SessionError, SessionTrade, Side,
};
use tracing::{debug, info};

pub mod snapshot_adapter;

pub use snapshot_adapter::{
    lookup_key, normalize, normalize_json, RawSessionCapture, SessionCapture, SnapshotAdapterError,
};

/// IB-style "no security definition" code.
const NO_SECURITY_DEFINITION: i64 = 200;

#[derive(Debug)]
pub struct PaperSession {
    capture: SessionCapture,
    connected: AtomicBool,
}

impl PaperSession {
    pub fn new(capture: SessionCapture) -> Self {
        Self {
            capture,
            connected: AtomicBool::new(true),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        let raw: RawSessionCapture = serde_json::from_str(json)
            .map_err(|e| SessionError::Decode(format!("session capture json: {e}")))?;
        let capture = normalize(raw).map_err(|e| SessionError::Decode(e.to_string()))?;
        Ok(Self::new(capture))
    }

    pub fn capture(&self) -> &SessionCapture {
        &self.capture
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(SessionError::NotConnected(
                "paper session already disconnected".to_string(),
            ))
        }
    }
}

fn for_account(row_account: &str, account: &str) -> bool {
    row_account.is_empty() || row_account == account
}

#[async_trait]
impl Session for PaperSession {
    fn name(&self) -> &'static str {
        "paper"
    }

    async fn positions(&self, account: &str) -> Result<Vec<Position>, SessionError> {
        self.ensure_connected()?;
        Ok(self
            .capture
            .positions
            .iter()
            .filter(|p| for_account(&p.account, account))
            .cloned()
            .collect())
    }

    async fn trades(&self) -> Result<Vec<SessionTrade>, SessionError> {
        self.ensure_connected()?;
        Ok(self.capture.trades.clone())
    }

    async fn latest_price(
        &self,
        instrument: &Instrument,
        _window: PriceWindow,
    ) -> Result<Option<i64>, SessionError> {
        self.ensure_connected()?;
        Ok(self.capture.prices.get(&lookup_key(instrument)).copied())
    }

    async fn simulate_order(
        &self,
        instrument: &Instrument,
        side: Side,
        qty: i64,
    ) -> Result<Option<MarginImpact>, SessionError> {
        self.ensure_connected()?;
        if !instrument.is_qualified() {
            return Err(SessionError::Api {
                code: Some(NO_SECURITY_DEFINITION),
                message: format!("what-if on unqualified contract {}", instrument.symbol),
            });
        }
        let key = (lookup_key(instrument), side, qty);
        let impact = self.capture.what_if.get(&key).copied();
        debug!(symbol = %instrument.symbol, side = side.as_str(), qty, found = impact.is_some(), "paper what-if");
        Ok(impact)
    }

    async fn qualify(&self, instrument: &Instrument) -> Result<Instrument, SessionError> {
        self.ensure_connected()?;
        let key = lookup_key(instrument);
        let Some(def) = self.capture.contracts.iter().find(|c| lookup_key(c) == key) else {
            return Err(SessionError::Api {
                code: Some(NO_SECURITY_DEFINITION),
                message: format!("no security definition for {}", instrument.symbol),
            });
        };
        let mut out = instrument.clone();
        out.con_id = out.con_id.or(def.con_id);
        out.exchange = out.exchange.or_else(|| def.exchange.clone());
        out.currency = out.currency.or_else(|| def.currency.clone());
        Ok(out)
    }

    async fn account_values(&self, account: &str) -> Result<Vec<AccountValue>, SessionError> {
        self.ensure_connected()?;
        Ok(self
            .capture
            .account_values
            .iter()
            .filter(|v| for_account(&v.account, account))
            .cloned()
            .collect())
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            info!("paper session disconnected");
        }
    }
}

/// Opens a [`PaperSession`] from a capture file on every `connect`.
#[derive(Debug, Clone)]
pub struct PaperConnector {
    path: PathBuf,
}

impl PaperConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read and normalize the capture. Every failure is `NotConnected`.
    pub fn open(&self) -> Result<PaperSession, SessionError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            SessionError::NotConnected(format!(
                "cannot read session capture {}: {e}",
                self.path.display()
            ))
        })?;
        let session = PaperSession::from_json(&raw).map_err(|e| {
            SessionError::NotConnected(format!(
                "invalid session capture {}: {e}",
                self.path.display()
            ))
        })?;
        info!(
            path = %self.path.display(),
            positions = session.capture.positions.len(),
            trades = session.capture.trades.len(),
            rejected_positions = session.capture.rejected.len(),
            "paper session connected"
        );
        Ok(session)
    }
}

#[async_trait]
impl SessionConnector for PaperConnector {
    async fn connect(&self) -> Result<Box<dyn Session>, SessionError> {
        Ok(Box::new(self.open()?))
    }
}
