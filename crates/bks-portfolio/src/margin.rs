//! What-if margin estimation.
//!
//! For each position a non-executing order is simulated in the direction that
//! would add to it (BUY when long, SELL when short) for `|qty|`, and the
//! incremental initial / maintenance margin reported by the risk engine is
//! read back. Unqualified instruments are qualified first.
//!
//! The result is only meaningful at the instant it was computed. A missing
//! result is reported as [`MarginOutcome::Unavailable`], never as zero.

use bks_schemas::{Instrument, MarginUsage, Position, Session, Side};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnavailableReason {
    /// Zero quantity: no direction to simulate.
    FlatPosition,
    /// Qualification failed or returned a still-unqualified instrument.
    Unqualified(String),
    /// The simulation call itself failed.
    SimulationFailed(String),
    /// The risk engine returned nothing.
    NoResult,
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnavailableReason::FlatPosition => write!(f, "flat position"),
            UnavailableReason::Unqualified(msg) => write!(f, "instrument not qualified: {msg}"),
            UnavailableReason::SimulationFailed(msg) => write!(f, "simulation failed: {msg}"),
            UnavailableReason::NoResult => write!(f, "no what-if result"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarginOutcome {
    Estimated(MarginUsage),
    Unavailable(UnavailableReason),
}

impl MarginOutcome {
    pub fn usage(&self) -> Option<&MarginUsage> {
        match self {
            MarginOutcome::Estimated(u) => Some(u),
            MarginOutcome::Unavailable(_) => None,
        }
    }
}

/// Direction and size of the simulated order for `position`, or `None` when flat.
pub fn simulated_order_for(position: &Position) -> Option<(Side, i64)> {
    match position.qty {
        0 => None,
        q if q > 0 => Some((Side::Buy, q)),
        q => Some((Side::Sell, q.saturating_abs())),
    }
}

pub async fn estimate_margin<S>(
    session: &S,
    position: &Position,
    now: DateTime<Utc>,
) -> MarginOutcome
where
    S: Session + ?Sized,
{
    let symbol = position.instrument.symbol.as_str();
    let Some((side, qty)) = simulated_order_for(position) else {
        return MarginOutcome::Unavailable(UnavailableReason::FlatPosition);
    };

    let instrument = match qualified(session, &position.instrument).await {
        Ok(inst) => inst,
        Err(reason) => {
            warn!(symbol, %reason, "margin estimate unavailable");
            return MarginOutcome::Unavailable(reason);
        }
    };

    match session.simulate_order(&instrument, side, qty).await {
        Ok(Some(impact)) => {
            debug!(
                symbol,
                side = side.as_str(),
                qty,
                init = impact.init_margin_delta_micros,
                maint = impact.maint_margin_delta_micros,
                "what-if margin estimated"
            );
            MarginOutcome::Estimated(MarginUsage {
                position: position.clone(),
                init_margin_delta_micros: impact.init_margin_delta_micros,
                maint_margin_delta_micros: impact.maint_margin_delta_micros,
                computed_at: now,
            })
        }
        Ok(None) => {
            debug!(symbol, "what-if returned no result");
            MarginOutcome::Unavailable(UnavailableReason::NoResult)
        }
        Err(err) => {
            warn!(symbol, error = %err, "what-if simulation failed");
            MarginOutcome::Unavailable(UnavailableReason::SimulationFailed(err.to_string()))
        }
    }
}

async fn qualified<S>(session: &S, instrument: &Instrument) -> Result<Instrument, UnavailableReason>
where
    S: Session + ?Sized,
{
    if instrument.is_qualified() {
        return Ok(instrument.clone());
    }
    let resolved = session
        .qualify(instrument)
        .await
        .map_err(|e| UnavailableReason::Unqualified(e.to_string()))?;
    if !resolved.is_qualified() {
        return Err(UnavailableReason::Unqualified(format!(
            "{} still missing identifying fields",
            instrument.symbol
        )));
    }
    Ok(resolved)
}
