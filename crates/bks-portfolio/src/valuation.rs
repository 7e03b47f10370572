//! Market valuation of positions.
//!
//! Price source policy, per position:
//! 1. latest short-interval sample from the session, if present and > 0
//! 2. otherwise the position's average cost basis ([`PricingMethod::CostBasis`])
//!
//! `market_value = qty * price * multiplier`, where the multiplier comes from
//! the instrument class (100 for standard option contracts, 1 when unlisted).
//!
//! A failing lookup never escapes: the position is reported with a zero
//! market value and [`PricingMethod::Failed`], and the batch carries on.

use std::collections::BTreeMap;

use bks_schemas::{
    mul_qty_micros, Position, PriceWindow, PricingMethod, SecType, Session, ValuedPosition,
};
use tracing::{error, info, warn};

/// Contract multiplier per instrument class code (`"OPT"`, `"FOP"`, ...).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultiplierTable {
    by_code: BTreeMap<String, i64>,
}

impl Default for MultiplierTable {
    fn default() -> Self {
        Self::from_entries([("OPT", 100)])
    }
}

impl MultiplierTable {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, i64)>,
        S: AsRef<str>,
    {
        let by_code = entries
            .into_iter()
            .map(|(code, m)| (SecType::parse(code.as_ref()).as_str().to_string(), m))
            .collect();
        Self { by_code }
    }

    pub fn multiplier_for(&self, sec_type: &SecType) -> i64 {
        self.by_code.get(sec_type.as_str()).copied().unwrap_or(1)
    }
}

/// Value one position. Never fails; see the module docs for the fallback rules.
pub async fn value_position<S>(
    session: &S,
    position: &Position,
    window: PriceWindow,
    multipliers: &MultiplierTable,
) -> ValuedPosition
where
    S: Session + ?Sized,
{
    let symbol = position.instrument.symbol.as_str();
    let multiplier = multipliers.multiplier_for(&position.instrument.sec_type);

    let (price_micros, method) = match session.latest_price(&position.instrument, window).await {
        Ok(Some(px)) if px > 0 => (px, PricingMethod::LiveQuote),
        Ok(sample) => {
            info!(
                symbol,
                sample = ?sample,
                avg_cost_micros = position.avg_cost_micros,
                "no usable price sample; valuing at average cost"
            );
            (position.avg_cost_micros, PricingMethod::CostBasis)
        }
        Err(err) => {
            error!(symbol, error = %err, "price lookup failed; market value set to zero");
            return failed(position, multiplier);
        }
    };

    match mul_qty_micros(position.qty, price_micros, multiplier) {
        Ok(market_value_micros) => ValuedPosition {
            position: position.clone(),
            price_micros,
            multiplier,
            market_value_micros,
            method,
        },
        Err(err) => {
            warn!(symbol, error = %err, "market value not representable; set to zero");
            failed(position, multiplier)
        }
    }
}

/// Value every position in order, one lookup at a time.
pub async fn value_positions<S>(
    session: &S,
    positions: &[Position],
    window: PriceWindow,
    multipliers: &MultiplierTable,
) -> Vec<ValuedPosition>
where
    S: Session + ?Sized,
{
    let mut out = Vec::with_capacity(positions.len());
    for position in positions {
        out.push(value_position(session, position, window, multipliers).await);
    }
    out
}

fn failed(position: &Position, multiplier: i64) -> ValuedPosition {
    ValuedPosition {
        position: position.clone(),
        price_micros: 0,
        multiplier,
        market_value_micros: 0,
        method: PricingMethod::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bks_schemas::{Instrument, MarginImpact, SessionError, SessionTrade, Side, MICROS_PER_UNIT};
    use std::collections::HashMap;

    /// Price lookups answer from a fixed table; anything else is unused here.
    struct PriceTable {
        prices: HashMap<String, Result<Option<i64>, SessionError>>,
    }

    #[async_trait]
    impl Session for PriceTable {
        fn name(&self) -> &'static str {
            "price-table"
        }
        async fn positions(&self, _account: &str) -> Result<Vec<Position>, SessionError> {
            Ok(Vec::new())
        }
        async fn trades(&self) -> Result<Vec<SessionTrade>, SessionError> {
            Ok(Vec::new())
        }
        async fn latest_price(
            &self,
            instrument: &Instrument,
            _window: PriceWindow,
        ) -> Result<Option<i64>, SessionError> {
            self.prices
                .get(&instrument.symbol)
                .cloned()
                .unwrap_or(Ok(None))
        }
        async fn simulate_order(
            &self,
            _instrument: &Instrument,
            _side: Side,
            _qty: i64,
        ) -> Result<Option<MarginImpact>, SessionError> {
            Ok(None)
        }
        async fn qualify(&self, instrument: &Instrument) -> Result<Instrument, SessionError> {
            Ok(instrument.clone())
        }
    }

    fn session(entries: Vec<(&str, Result<Option<i64>, SessionError>)>) -> PriceTable {
        PriceTable {
            prices: entries
                .into_iter()
                .map(|(s, r)| (s.to_string(), r))
                .collect(),
        }
    }

    fn position(symbol: &str, sec_type: SecType, qty: i64, avg_cost: i64) -> Position {
        let mut instrument = Instrument::stock(symbol);
        instrument.sec_type = sec_type;
        Position {
            account: "U1".to_string(),
            instrument,
            qty,
            avg_cost_micros: avg_cost * MICROS_PER_UNIT,
        }
    }

    #[tokio::test]
    async fn live_quote_is_used_when_positive() {
        let s = session(vec![("ABC", Ok(Some(12 * MICROS_PER_UNIT)))]);
        let p = position("ABC", SecType::Stock, 10, 9);
        let v = value_position(&s, &p, PriceWindow::default(), &MultiplierTable::default()).await;
        assert_eq!(v.method, PricingMethod::LiveQuote);
        assert_eq!(v.market_value_micros, 120 * MICROS_PER_UNIT);
    }

    #[tokio::test]
    async fn missing_sample_falls_back_to_cost_basis() {
        let s = session(vec![]);
        let p = position("ABC", SecType::Stock, 10, 9);
        let v = value_position(&s, &p, PriceWindow::default(), &MultiplierTable::default()).await;
        assert_eq!(v.method, PricingMethod::CostBasis);
        assert_eq!(v.market_value_micros, 90 * MICROS_PER_UNIT);
    }

    #[tokio::test]
    async fn non_positive_sample_falls_back_to_cost_basis() {
        let s = session(vec![("ABC", Ok(Some(0))), ("XYZ", Ok(Some(-5)))]);
        let table = MultiplierTable::default();
        for sym in ["ABC", "XYZ"] {
            let p = position(sym, SecType::Stock, -4, 25);
            let v = value_position(&s, &p, PriceWindow::default(), &table).await;
            assert_eq!(v.method, PricingMethod::CostBasis, "{sym}");
            assert_eq!(v.market_value_micros, -100 * MICROS_PER_UNIT, "{sym}");
        }
    }

    #[tokio::test]
    async fn option_contracts_apply_multiplier_to_both_paths() {
        let s = session(vec![("SPY", Ok(Some(2 * MICROS_PER_UNIT)))]);
        let table = MultiplierTable::default();

        let live = position("SPY", SecType::Option, 3, 1);
        let v = value_position(&s, &live, PriceWindow::default(), &table).await;
        assert_eq!(v.multiplier, 100);
        assert_eq!(v.market_value_micros, 600 * MICROS_PER_UNIT);

        let fallback = position("QQQ", SecType::Option, 3, 1);
        let v = value_position(&s, &fallback, PriceWindow::default(), &table).await;
        assert_eq!(v.method, PricingMethod::CostBasis);
        assert_eq!(v.market_value_micros, 300 * MICROS_PER_UNIT);
    }

    #[tokio::test]
    async fn lookup_error_yields_zero_and_batch_continues() {
        let s = session(vec![
            ("BAD", Err(SessionError::Transport("timeout".to_string()))),
            ("OK", Ok(Some(5 * MICROS_PER_UNIT))),
        ]);
        let positions = vec![
            position("BAD", SecType::Stock, 10, 9),
            position("OK", SecType::Stock, 2, 4),
        ];
        let table = MultiplierTable::default();
        let out = value_positions(&s, &positions, PriceWindow::default(), &table).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].method, PricingMethod::Failed);
        assert_eq!(out[0].market_value_micros, 0);
        assert_eq!(out[1].method, PricingMethod::LiveQuote);
        assert_eq!(out[1].market_value_micros, 10 * MICROS_PER_UNIT);
    }

    #[test]
    fn multiplier_table_normalizes_codes_and_defaults_to_one() {
        let t = MultiplierTable::from_entries([("opt", 100), ("FOP", 50)]);
        assert_eq!(t.multiplier_for(&SecType::Option), 100);
        assert_eq!(t.multiplier_for(&SecType::FutureOption), 50);
        assert_eq!(t.multiplier_for(&SecType::Stock), 1);
    }
}
