use bks_schemas::{Instrument, TradeRecord, MICROS_PER_UNIT};

/// Deterministic identity of an external record.
///
/// Built only from immutable or slow-changing attributes; never from market
/// value or margin, which change every run. Surrounding whitespace is
/// stripped, so a key built locally and one read back from a store compare
/// equal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NaturalKey(String);

impl NaturalKey {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.len() == raw.len() {
            Self(raw)
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// `SECTYPE-SYMBOL[-EXPIRY][-STRIKE][-RIGHT][-CURRENCY]`.
///
/// Optional parts are omitted when absent, empty, or (for strike) zero.
/// Strike renders with at least one decimal: `450.0`, `452.5`.
pub fn position_key(instrument: &Instrument) -> NaturalKey {
    let mut parts: Vec<String> = vec![
        instrument.sec_type.as_str().to_string(),
        instrument.symbol.trim().to_string(),
    ];
    if let Some(expiry) = non_empty(instrument.expiry.as_deref()) {
        parts.push(expiry.to_string());
    }
    if let Some(strike) = instrument.strike_micros.filter(|s| *s != 0) {
        parts.push(format_strike(strike));
    }
    if let Some(right) = instrument.right {
        parts.push(right.as_str().to_string());
    }
    if let Some(currency) = non_empty(instrument.currency.as_deref()) {
        parts.push(currency.to_string());
    }
    NaturalKey::new(parts.join("-"))
}

/// Trades are keyed by the execution id that opened the record.
pub fn trade_key(trade: &TradeRecord) -> NaturalKey {
    NaturalKey::new(trade.record_id.as_str())
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn format_strike(micros: i64) -> String {
    let sign = if micros < 0 { "-" } else { "" };
    let abs = micros.unsigned_abs();
    let unit = MICROS_PER_UNIT as u64;
    let whole = abs / unit;
    let frac = format!("{:06}", abs % unit);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        format!("{sign}{whole}.0")
    } else {
        format!("{sign}{whole}.{frac}")
    }
}
