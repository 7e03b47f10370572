//! Session capture → typed records.
//!
//! A capture is a JSON dump of what a brokerage session reported at one
//! point in time: positions, trades with their fills, latest prices, what-if
//! margin results, account values, and the contract definitions used for
//! qualification. The `Raw*` structs mirror that document; [`normalize`]
//! converts it into validated domain types or fails naming the offending
//! entry (`"trades[2].fills[0]"`).
//!
//! Pure and deterministic: no IO, no async.

use std::collections::BTreeMap;

use bks_schemas::{
    price_to_micros, AccountValue, Instrument, MarginImpact, OptionRight, Position, PricingError,
    RawFill, SecType, SessionTrade, Side,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::warn;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotAdapterError {
    /// A contract has an empty symbol.
    MissingSymbol { entry: String },
    /// A trade's order has no id.
    MissingOrderId { entry: String },
    /// A fill has no execution id.
    MissingExecId { entry: String },
    /// An action / side string could not be mapped to [`Side`].
    UnknownSide { entry: String, raw: String },
    /// An option right other than C/P/CALL/PUT.
    UnknownRight { entry: String, raw: String },
    /// Quantities are whole shares / contracts.
    FractionalQuantity { entry: String, qty: String },
    /// A price or amount that cannot be represented in micros.
    InvalidAmount { entry: String, reason: PricingError },
    /// A timestamp in none of the accepted formats.
    InvalidTimestamp { entry: String, raw: String },
}

impl std::fmt::Display for SnapshotAdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingSymbol { entry } => write!(f, "{entry}: contract has empty symbol"),
            Self::MissingOrderId { entry } => write!(f, "{entry}: order has empty order_id"),
            Self::MissingExecId { entry } => write!(f, "{entry}: fill has empty exec_id"),
            Self::UnknownSide { entry, raw } => {
                write!(f, "{entry}: unrecognised side '{raw}'")
            }
            Self::UnknownRight { entry, raw } => {
                write!(f, "{entry}: unrecognised option right '{raw}'")
            }
            Self::FractionalQuantity { entry, qty } => {
                write!(f, "{entry}: quantity {qty} is not a whole number")
            }
            Self::InvalidAmount { entry, reason } => write!(f, "{entry}: {reason}"),
            Self::InvalidTimestamp { entry, raw } => {
                write!(f, "{entry}: unparseable timestamp '{raw}'")
            }
        }
    }
}

impl std::error::Error for SnapshotAdapterError {}

// ---------------------------------------------------------------------------
// Raw wire-level structs
// ---------------------------------------------------------------------------

/// Brokers emit ids as numbers or strings.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Int(i64),
    Str(String),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Int(n) => n.to_string(),
            RawId::Str(s) => s.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawContract {
    #[serde(default)]
    pub con_id: Option<i64>,
    pub symbol: String,
    #[serde(default = "default_sec_type")]
    pub sec_type: String,
    /// `YYYYMMDD` / `YYYYMM`; empty means none.
    #[serde(default)]
    pub expiry: Option<String>,
    /// 0 means none.
    #[serde(default)]
    pub strike: Option<f64>,
    #[serde(default)]
    pub right: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
}

fn default_sec_type() -> String {
    "STK".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPosition {
    #[serde(default)]
    pub account: String,
    pub contract: RawContract,
    pub position: f64,
    pub avg_cost: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOrder {
    pub order_id: RawId,
    /// `BUY` / `SELL` (also `BOT` / `SLD`).
    pub action: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawExecution {
    pub exec_id: String,
    /// RFC 3339, or `YYYYMMDD HH:MM:SS` / `YYYY-MM-DD HH:MM:SS` in UTC.
    pub time: String,
    pub shares: f64,
    pub price: f64,
    #[serde(default)]
    pub commission: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTrade {
    pub contract: RawContract,
    pub order: RawOrder,
    #[serde(default)]
    pub fills: Vec<RawExecution>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPrice {
    pub contract: RawContract,
    pub price: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawWhatIf {
    pub contract: RawContract,
    pub side: String,
    pub quantity: f64,
    pub init_margin_change: f64,
    pub maint_margin_change: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAccountValue {
    #[serde(default)]
    pub account: String,
    pub tag: String,
    pub value: String,
    #[serde(default)]
    pub currency: String,
}

/// Top-level capture document. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSessionCapture {
    #[serde(default)]
    pub positions: Vec<RawPosition>,
    #[serde(default)]
    pub trades: Vec<RawTrade>,
    #[serde(default)]
    pub prices: Vec<RawPrice>,
    #[serde(default)]
    pub what_if: Vec<RawWhatIf>,
    #[serde(default)]
    pub account_values: Vec<RawAccountValue>,
    #[serde(default)]
    pub contracts: Vec<RawContract>,
}

// ---------------------------------------------------------------------------
// Normalized capture
// ---------------------------------------------------------------------------

/// Lookup identity of an instrument inside a capture: class, symbol and the
/// derivative terms. Qualification-only fields (con id, exchange, currency)
/// are excluded so qualified and unqualified forms resolve alike.
pub fn lookup_key(inst: &Instrument) -> String {
    format!(
        "{}|{}|{}|{}|{}",
        inst.sec_type.as_str(),
        inst.symbol,
        inst.expiry.as_deref().unwrap_or(""),
        inst.strike_micros.unwrap_or(0),
        inst.right.map(|r| r.as_str()).unwrap_or("")
    )
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCapture {
    pub positions: Vec<Position>,
    pub trades: Vec<SessionTrade>,
    /// [`lookup_key`] → latest price micros.
    pub prices: BTreeMap<String, i64>,
    /// ([`lookup_key`], side, qty) → margin deltas.
    pub what_if: BTreeMap<(String, Side, i64), MarginImpact>,
    pub account_values: Vec<AccountValue>,
    pub contracts: Vec<Instrument>,
    /// Position entries left out of `positions`.
    pub rejected: Vec<SnapshotAdapterError>,
}

// ---------------------------------------------------------------------------
// Normalization helpers
// ---------------------------------------------------------------------------

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn amount(entry: &str, value: f64) -> Result<i64, SnapshotAdapterError> {
    price_to_micros(value).map_err(|reason| SnapshotAdapterError::InvalidAmount {
        entry: entry.to_string(),
        reason,
    })
}

fn whole_qty(entry: &str, qty: f64) -> Result<i64, SnapshotAdapterError> {
    if !qty.is_finite() || qty.fract() != 0.0 || qty.abs() > i64::MAX as f64 {
        return Err(SnapshotAdapterError::FractionalQuantity {
            entry: entry.to_string(),
            qty: qty.to_string(),
        });
    }
    Ok(qty as i64)
}

fn parse_side(entry: &str, raw: &str) -> Result<Side, SnapshotAdapterError> {
    Side::parse(raw).ok_or_else(|| SnapshotAdapterError::UnknownSide {
        entry: entry.to_string(),
        raw: raw.to_string(),
    })
}

fn timestamp(entry: &str, raw: &str) -> Result<DateTime<Utc>, SnapshotAdapterError> {
    let t = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Ok(dt.with_timezone(&Utc));
    }
    ["%Y%m%d %H:%M:%S", "%Y%m%d-%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(t, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| SnapshotAdapterError::InvalidTimestamp {
            entry: entry.to_string(),
            raw: raw.to_string(),
        })
}

fn contract(entry: &str, raw: RawContract) -> Result<Instrument, SnapshotAdapterError> {
    let symbol = raw.symbol.trim().to_string();
    if symbol.is_empty() {
        return Err(SnapshotAdapterError::MissingSymbol {
            entry: entry.to_string(),
        });
    }
    let strike_micros = match raw.strike {
        Some(s) if s != 0.0 => Some(amount(entry, s)?),
        _ => None,
    };
    let right = match non_empty(raw.right) {
        Some(r) => Some(OptionRight::parse(&r).ok_or(SnapshotAdapterError::UnknownRight {
            entry: entry.to_string(),
            raw: r,
        })?),
        None => None,
    };
    Ok(Instrument {
        con_id: raw.con_id.filter(|id| *id != 0),
        symbol,
        sec_type: SecType::parse(&raw.sec_type),
        expiry: non_empty(raw.expiry),
        strike_micros,
        right,
        currency: non_empty(raw.currency),
        exchange: non_empty(raw.exchange),
    })
}

fn trade(entry: &str, raw: RawTrade) -> Result<SessionTrade, SnapshotAdapterError> {
    let instrument = contract(&format!("{entry}.contract"), raw.contract)?;
    let order_id = raw.order.order_id.into_string();
    if order_id.is_empty() {
        return Err(SnapshotAdapterError::MissingOrderId {
            entry: format!("{entry}.order"),
        });
    }
    let side = parse_side(&format!("{entry}.order"), &raw.order.action)?;

    let fills = raw
        .fills
        .into_iter()
        .enumerate()
        .map(|(i, f)| {
            let entry = format!("{entry}.fills[{i}]");
            let exec_id = f.exec_id.trim().to_string();
            if exec_id.is_empty() {
                return Err(SnapshotAdapterError::MissingExecId { entry });
            }
            Ok(RawFill {
                exec_id,
                order_id: order_id.clone(),
                instrument: instrument.clone(),
                side,
                qty: whole_qty(&entry, f.shares)?,
                price_micros: amount(&entry, f.price)?,
                commission_micros: f.commission.map(|c| amount(&entry, c)).transpose()?,
                ts_utc: timestamp(&entry, &f.time)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SessionTrade {
        order_id,
        instrument,
        side,
        fills,
    })
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

fn position(entry: &str, raw: RawPosition) -> Result<Position, SnapshotAdapterError> {
    Ok(Position {
        account: raw.account.trim().to_string(),
        instrument: contract(entry, raw.contract)?,
        qty: whole_qty(entry, raw.position)?,
        avg_cost_micros: amount(entry, raw.avg_cost)?,
    })
}

/// Normalize a raw capture.
///
/// A malformed position is left out and kept in `rejected`; every other
/// section fails on its first malformed entry.
pub fn normalize(raw: RawSessionCapture) -> Result<SessionCapture, SnapshotAdapterError> {
    let mut out = SessionCapture::default();

    for (i, p) in raw.positions.into_iter().enumerate() {
        match position(&format!("positions[{i}]"), p) {
            Ok(position) => out.positions.push(position),
            Err(e) => {
                warn!(error = %e, "position entry rejected");
                out.rejected.push(e);
            }
        }
    }

    for (i, t) in raw.trades.into_iter().enumerate() {
        out.trades.push(trade(&format!("trades[{i}]"), t)?);
    }

    for (i, p) in raw.prices.into_iter().enumerate() {
        let entry = format!("prices[{i}]");
        let inst = contract(&entry, p.contract)?;
        out.prices.insert(lookup_key(&inst), amount(&entry, p.price)?);
    }

    for (i, w) in raw.what_if.into_iter().enumerate() {
        let entry = format!("what_if[{i}]");
        let inst = contract(&entry, w.contract)?;
        let key = (
            lookup_key(&inst),
            parse_side(&entry, &w.side)?,
            whole_qty(&entry, w.quantity)?,
        );
        let impact = MarginImpact {
            init_margin_delta_micros: amount(&entry, w.init_margin_change)?,
            maint_margin_delta_micros: amount(&entry, w.maint_margin_change)?,
        };
        out.what_if.insert(key, impact);
    }

    out.account_values = raw
        .account_values
        .into_iter()
        .map(|v| AccountValue::new(v.account.trim(), v.tag.trim(), v.value, v.currency.trim()))
        .collect();

    for (i, c) in raw.contracts.into_iter().enumerate() {
        out.contracts.push(contract(&format!("contracts[{i}]"), c)?);
    }

    Ok(out)
}

/// `json → RawSessionCapture → SessionCapture`.
pub fn normalize_json(json: &str) -> Result<SessionCapture, Box<dyn std::error::Error + Send + Sync>> {
    let raw: RawSessionCapture = serde_json::from_str(json)?;
    Ok(normalize(raw)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bks_schemas::MICROS_PER_UNIT;
    use chrono::TimeZone;

    fn raw_contract(symbol: &str) -> RawContract {
        RawContract {
            con_id: None,
            symbol: symbol.to_string(),
            sec_type: "STK".to_string(),
            expiry: None,
            strike: None,
            right: None,
            currency: None,
            exchange: None,
        }
    }

    #[test]
    fn empty_document_normalizes_to_empty_capture() {
        assert_eq!(normalize_json("{}").unwrap(), SessionCapture::default());
    }

    #[test]
    fn option_contract_fields_are_normalized() {
        let mut c = raw_contract(" SPY ");
        c.sec_type = "opt".to_string();
        c.expiry = Some("20240621".to_string());
        c.strike = Some(452.5);
        c.right = Some("CALL".to_string());
        c.currency = Some("".to_string());
        c.con_id = Some(0);
        let inst = contract("x", c).unwrap();

        assert_eq!(inst.symbol, "SPY");
        assert_eq!(inst.sec_type, SecType::Option);
        assert_eq!(inst.strike_micros, Some(452_500_000));
        assert_eq!(inst.right, Some(OptionRight::Call));
        assert_eq!(inst.currency, None);
        assert_eq!(inst.con_id, None);
    }

    #[test]
    fn fractional_position_is_rejected_alone_with_entry_name() {
        let raw = RawSessionCapture {
            positions: vec![
                RawPosition {
                    account: "U1".to_string(),
                    contract: raw_contract("AAPL"),
                    position: 1.5,
                    avg_cost: 100.0,
                },
                RawPosition {
                    account: "U1".to_string(),
                    contract: raw_contract("SPY"),
                    position: 30.0,
                    avg_cost: 400.0,
                },
            ],
            ..RawSessionCapture::default()
        };
        let capture = normalize(raw).unwrap();

        assert_eq!(capture.positions.len(), 1);
        assert_eq!(capture.positions[0].instrument.symbol, "SPY");
        assert_eq!(capture.positions[0].qty, 30);
        assert_eq!(
            capture.rejected,
            vec![SnapshotAdapterError::FractionalQuantity {
                entry: "positions[0]".to_string(),
                qty: "1.5".to_string()
            }]
        );
    }

    #[test]
    fn trade_fills_inherit_order_contract_and_side() {
        let json = r#"{
            "trades": [{
                "contract": { "symbol": "ABC", "sec_type": "STK" },
                "order": { "order_id": 17, "action": "BOT" },
                "fills": [
                    { "exec_id": "e1", "time": "20240501 14:30:00", "shares": 10, "price": 100, "commission": 1 },
                    { "exec_id": "e2", "time": "2024-05-01T14:31:00Z", "shares": 5, "price": 103 }
                ]
            }]
        }"#;
        let cap = normalize_json(json).unwrap();
        let t = &cap.trades[0];

        assert_eq!(t.order_id, "17");
        assert_eq!(t.side, Side::Buy);
        assert_eq!(t.fills[0].order_id, "17");
        assert_eq!(t.fills[0].commission_micros, Some(MICROS_PER_UNIT));
        assert_eq!(t.fills[1].commission_micros, None);
        assert_eq!(
            t.fills[0].ts_utc,
            Utc.with_ymd_and_hms(2024, 5, 1, 14, 30, 0).unwrap()
        );
    }

    #[test]
    fn bad_fill_timestamp_names_the_fill() {
        let json = r#"{
            "trades": [{
                "contract": { "symbol": "ABC" },
                "order": { "order_id": "9", "action": "SELL" },
                "fills": [ { "exec_id": "e1", "time": "yesterday", "shares": 1, "price": 1 } ]
            }]
        }"#;
        let err = normalize_json(json).unwrap_err().to_string();
        assert_eq!(err, "trades[0].fills[0]: unparseable timestamp 'yesterday'");
    }

    #[test]
    fn lookup_key_ignores_qualification_fields() {
        let a = Instrument::stock("MSFT");
        let mut b = a.clone();
        b.con_id = Some(272093);
        b.exchange = Some("SMART".to_string());
        b.currency = Some("USD".to_string());
        assert_eq!(lookup_key(&a), lookup_key(&b));
    }

    #[test]
    fn what_if_is_keyed_by_instrument_side_and_quantity() {
        let json = r#"{
            "what_if": [ {
                "contract": { "symbol": "SPY" },
                "side": "BUY", "quantity": 30,
                "init_margin_change": 2500.25, "maint_margin_change": 2250
            } ]
        }"#;
        let cap = normalize_json(json).unwrap();
        let key = (lookup_key(&Instrument::stock("SPY")), Side::Buy, 30);
        assert_eq!(
            cap.what_if.get(&key).map(|m| m.init_margin_delta_micros),
            Some(2_500_250_000)
        );
    }
}
