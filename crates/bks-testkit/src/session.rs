use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bks_schemas::{
    AccountValue, Instrument, MarginImpact, Position, PriceWindow, RawFill, Session,
    SessionConnector, SessionError, SessionTrade, Side, MICROS_PER_UNIT,
};
use chrono::{DateTime, TimeZone, Utc};

/// What the session was asked, shared between clones.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionCalls {
    pub price_lookups: Vec<String>,
    pub qualifications: Vec<String>,
    pub simulations: Vec<(String, Side, i64)>,
    pub disconnects: usize,
}

/// Session answering from fixed tables keyed by symbol.
///
/// Clones share the call log, so a test can keep one handle while the
/// runtime owns another.
#[derive(Clone, Default)]
pub struct ScriptedSession {
    pub positions: Vec<Position>,
    pub trades: Vec<SessionTrade>,
    pub prices: BTreeMap<String, i64>,
    pub what_if: BTreeMap<String, MarginImpact>,
    pub account_values: Vec<AccountValue>,
    pub failing_prices: BTreeSet<String>,
    pub fail_positions: bool,
    calls: Arc<Mutex<SessionCalls>>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.positions.push(position);
        self
    }

    pub fn with_price(mut self, symbol: &str, price_micros: i64) -> Self {
        self.prices.insert(symbol.to_string(), price_micros);
        self
    }

    pub fn with_what_if(mut self, symbol: &str, init_micros: i64, maint_micros: i64) -> Self {
        self.what_if.insert(
            symbol.to_string(),
            MarginImpact {
                init_margin_delta_micros: init_micros,
                maint_margin_delta_micros: maint_micros,
            },
        );
        self
    }

    /// One trade per order id, in first-seen order.
    pub fn with_fills(mut self, fills: Vec<RawFill>) -> Self {
        for f in fills {
            match self.trades.iter_mut().find(|t| t.order_id == f.order_id) {
                Some(trade) => trade.fills.push(f),
                None => self.trades.push(SessionTrade {
                    order_id: f.order_id.clone(),
                    instrument: f.instrument.clone(),
                    side: f.side,
                    fills: vec![f],
                }),
            }
        }
        self
    }

    pub fn with_account_value(mut self, tag: &str, value: &str) -> Self {
        let account = self
            .positions
            .first()
            .map(|p| p.account.clone())
            .unwrap_or_else(|| "U1".to_string());
        self.account_values
            .push(AccountValue::new(account, tag, value, "BASE"));
        self
    }

    pub fn calls(&self) -> SessionCalls {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, f: impl FnOnce(&mut SessionCalls)) {
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut *calls);
    }
}

#[async_trait]
impl Session for ScriptedSession {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn positions(&self, account: &str) -> Result<Vec<Position>, SessionError> {
        if self.fail_positions {
            return Err(SessionError::Transport("scripted positions failure".to_string()));
        }
        Ok(self
            .positions
            .iter()
            .filter(|p| p.account == account)
            .cloned()
            .collect())
    }

    async fn trades(&self) -> Result<Vec<SessionTrade>, SessionError> {
        Ok(self.trades.clone())
    }

    async fn latest_price(
        &self,
        instrument: &Instrument,
        _window: PriceWindow,
    ) -> Result<Option<i64>, SessionError> {
        self.record(|c| c.price_lookups.push(instrument.symbol.clone()));
        if self.failing_prices.contains(&instrument.symbol) {
            return Err(SessionError::Transport(format!(
                "scripted price timeout for {}",
                instrument.symbol
            )));
        }
        Ok(self.prices.get(&instrument.symbol).copied())
    }

    async fn simulate_order(
        &self,
        instrument: &Instrument,
        side: Side,
        qty: i64,
    ) -> Result<Option<MarginImpact>, SessionError> {
        self.record(|c| c.simulations.push((instrument.symbol.clone(), side, qty)));
        if !instrument.is_qualified() {
            return Err(SessionError::Api {
                code: Some(200),
                message: "unqualified contract".to_string(),
            });
        }
        Ok(self.what_if.get(&instrument.symbol).copied())
    }

    async fn qualify(&self, instrument: &Instrument) -> Result<Instrument, SessionError> {
        self.record(|c| c.qualifications.push(instrument.symbol.clone()));
        let mut out = instrument.clone();
        out.con_id = out.con_id.or(Some(1));
        out.currency = out.currency.or_else(|| Some("USD".to_string()));
        out.exchange = out.exchange.or_else(|| Some("SMART".to_string()));
        Ok(out)
    }

    async fn account_values(&self, account: &str) -> Result<Vec<AccountValue>, SessionError> {
        Ok(self
            .account_values
            .iter()
            .filter(|v| v.account == account)
            .cloned()
            .collect())
    }

    async fn disconnect(&self) {
        self.record(|c| c.disconnects += 1);
    }
}

/// Hands out a clone of one [`ScriptedSession`].
pub struct ScriptedConnector {
    session: ScriptedSession,
}

impl ScriptedConnector {
    pub fn new(session: ScriptedSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl SessionConnector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn Session>, SessionError> {
        Ok(Box::new(self.session.clone()))
    }
}

/// Never connects.
pub struct FailingConnector;

#[async_trait]
impl SessionConnector for FailingConnector {
    async fn connect(&self) -> Result<Box<dyn Session>, SessionError> {
        Err(SessionError::NotConnected("gateway unreachable".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Fixture builders
// ---------------------------------------------------------------------------

/// Stock position in USD; prices in whole units.
pub fn position(account: &str, symbol: &str, qty: i64, avg_cost: i64) -> Position {
    let mut instrument = Instrument::stock(symbol);
    instrument.currency = Some("USD".to_string());
    Position {
        account: account.to_string(),
        instrument,
        qty,
        avg_cost_micros: avg_cost * MICROS_PER_UNIT,
    }
}

/// Stock fill; `price_micros` and `commission_micros` are already in micros,
/// `minute` offsets the timestamp from a fixed session open.
#[allow(clippy::too_many_arguments)]
pub fn fill(
    exec_id: &str,
    order_id: &str,
    symbol: &str,
    side: Side,
    qty: i64,
    price_micros: i64,
    commission_micros: Option<i64>,
    minute: u32,
) -> RawFill {
    RawFill {
        exec_id: exec_id.to_string(),
        order_id: order_id.to_string(),
        instrument: Instrument::stock(symbol),
        side,
        qty,
        price_micros,
        commission_micros,
        ts_utc: session_open() + chrono::Duration::minutes(minute as i64),
    }
}

fn session_open() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 13, 30, 0)
        .single()
        .unwrap_or_else(Utc::now)
}
