use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order / fill direction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    /// Accepts the spellings brokers commonly emit (`BUY`, `BOT`, `sell`, `SLD`, ...).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" | "BOT" | "B" => Some(Side::Buy),
            "SELL" | "SLD" | "S" => Some(Side::Sell),
            _ => None,
        }
    }
}

/// Instrument class. Unknown codes are preserved verbatim so they still
/// produce a stable natural key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SecType {
    Stock,
    Option,
    Future,
    FutureOption,
    Forex,
    Index,
    Bond,
    Cfd,
    Other(String),
}

impl SecType {
    pub fn as_str(&self) -> &str {
        match self {
            SecType::Stock => "STK",
            SecType::Option => "OPT",
            SecType::Future => "FUT",
            SecType::FutureOption => "FOP",
            SecType::Forex => "CASH",
            SecType::Index => "IND",
            SecType::Bond => "BOND",
            SecType::Cfd => "CFD",
            SecType::Other(code) => code.as_str(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        let code = raw.trim().to_ascii_uppercase();
        match code.as_str() {
            "STK" => SecType::Stock,
            "OPT" => SecType::Option,
            "FUT" => SecType::Future,
            "FOP" => SecType::FutureOption,
            "CASH" => SecType::Forex,
            "IND" => SecType::Index,
            "BOND" => SecType::Bond,
            "CFD" => SecType::Cfd,
            _ => SecType::Other(code),
        }
    }
}

impl From<String> for SecType {
    fn from(raw: String) -> Self {
        SecType::parse(&raw)
    }
}

impl From<SecType> for String {
    fn from(t: SecType) -> Self {
        t.as_str().to_string()
    }
}

impl std::fmt::Display for SecType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Option right.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OptionRight {
    #[serde(rename = "C")]
    Call,
    #[serde(rename = "P")]
    Put,
}

impl OptionRight {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionRight::Call => "C",
            OptionRight::Put => "P",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "C" | "CALL" => Some(OptionRight::Call),
            "P" | "PUT" => Some(OptionRight::Put),
            _ => None,
        }
    }
}

/// Instrument identity as known to the brokerage.
///
/// `con_id`, `exchange` and `currency` are what qualification resolves; an
/// instrument without them is not accepted by the what-if risk engine.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub con_id: Option<i64>,
    pub symbol: String,
    pub sec_type: SecType,
    /// `YYYYMMDD` or `YYYYMM` for dated contracts.
    pub expiry: Option<String>,
    pub strike_micros: Option<i64>,
    pub right: Option<OptionRight>,
    pub currency: Option<String>,
    pub exchange: Option<String>,
}

impl Instrument {
    /// Unqualified plain equity.
    pub fn stock(symbol: impl Into<String>) -> Self {
        Self {
            con_id: None,
            symbol: symbol.into(),
            sec_type: SecType::Stock,
            expiry: None,
            strike_micros: None,
            right: None,
            currency: None,
            exchange: None,
        }
    }

    pub fn is_qualified(&self) -> bool {
        self.con_id.is_some() && self.currency.is_some() && self.exchange.is_some()
    }
}

/// One execution event as produced by the trading session. Never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFill {
    /// Globally unique execution identifier.
    pub exec_id: String,
    /// Broker order the execution belongs to.
    pub order_id: String,
    pub instrument: Instrument,
    pub side: Side,
    pub qty: i64,
    pub price_micros: i64,
    /// `None` when the broker has not (yet) reported a commission.
    pub commission_micros: Option<i64>,
    pub ts_utc: DateTime<Utc>,
}

/// Canonical trade derived from one or more fills.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Execution id of the first fill in the group; the trade's natural key.
    pub record_id: String,
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    /// Always > 0.
    pub qty: i64,
    pub avg_price_micros: i64,
    pub commission_micros: i64,
    /// Timestamp of the first fill in the group.
    pub ts_utc: DateTime<Utc>,
}

/// Current holding, read from the brokerage account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub account: String,
    pub instrument: Instrument,
    /// Signed: positive = long, negative = short.
    pub qty: i64,
    pub avg_cost_micros: i64,
}

/// Where a market value's price came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingMethod {
    /// Latest positive price sample from the session.
    LiveQuote,
    /// No usable sample; average cost basis used instead.
    CostBasis,
    /// Lookup itself failed (or the product overflowed); market value is zero.
    Failed,
}

impl PricingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingMethod::LiveQuote => "live_quote",
            PricingMethod::CostBasis => "cost_basis",
            PricingMethod::Failed => "failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuedPosition {
    pub position: Position,
    /// Per-unit price the market value was computed from.
    pub price_micros: i64,
    pub multiplier: i64,
    pub market_value_micros: i64,
    pub method: PricingMethod,
}

/// Incremental margin impact of a position, valid only at `computed_at`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarginUsage {
    pub position: Position,
    pub init_margin_delta_micros: i64,
    pub maint_margin_delta_micros: i64,
    pub computed_at: DateTime<Utc>,
}

/// One account value row (tag/value/currency), as the brokerage reports it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountValue {
    pub account: String,
    pub tag: String,
    pub value: String,
    pub currency: String,
}

impl AccountValue {
    pub fn new(
        account: impl Into<String>,
        tag: impl Into<String>,
        value: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            account: account.into(),
            tag: tag.into(),
            value: value.into(),
            currency: currency.into(),
        }
    }
}
