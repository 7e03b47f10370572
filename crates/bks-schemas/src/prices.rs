//! Integer-micros money representation.
//!
//! Prices, cost basis, commissions, market values and margin amounts are all
//! carried as `i64` micros (1 unit = 1_000_000 micros). Products of quantity
//! and price are formed in `i128` and narrowed back with an explicit range
//! check, so an absurd input surfaces as [`PricingError::OutOfRange`] instead
//! of a wrapped or saturated number.
//!
//! `f64` only appears at the wire boundary:
//!
//! | Direction                    | Function            |
//! |------------------------------|---------------------|
//! | internal → store field       | [`micros_to_price`] |
//! | session payload → internal   | [`price_to_micros`] |

/// Scale factor: 1 price unit = 1_000_000 micros (6 decimal places).
pub const MICROS_PER_UNIT: i64 = 1_000_000;

/// Errors from converting or combining micros amounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    /// Input was `NaN` or infinite.
    NotFinite,
    /// Result does not fit in `i64` micros.
    OutOfRange,
    /// Average requested over a zero quantity.
    ZeroQuantity,
}

impl std::fmt::Display for PricingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PricingError::NotFinite => write!(f, "non-finite price (NaN or Inf)"),
            PricingError::OutOfRange => write!(f, "amount out of i64 micros range"),
            PricingError::ZeroQuantity => write!(f, "average over zero quantity"),
        }
    }
}

impl std::error::Error for PricingError {}

/// Convert micros to `f64` for serialization into an external store field.
pub fn micros_to_price(micros: i64) -> f64 {
    micros as f64 / MICROS_PER_UNIT as f64
}

/// Convert an `f64` amount read from a session payload into micros, rounding
/// to the nearest micro.
pub fn price_to_micros(price: f64) -> Result<i64, PricingError> {
    if !price.is_finite() {
        return Err(PricingError::NotFinite);
    }
    let scaled = price * MICROS_PER_UNIT as f64;
    if scaled > i64::MAX as f64 || scaled < i64::MIN as f64 {
        return Err(PricingError::OutOfRange);
    }
    Ok(scaled.round() as i64)
}

/// `qty * price_micros * multiplier`, range-checked.
pub fn mul_qty_micros(qty: i64, price_micros: i64, multiplier: i64) -> Result<i64, PricingError> {
    let wide = qty as i128 * price_micros as i128 * multiplier as i128;
    i64::try_from(wide).map_err(|_| PricingError::OutOfRange)
}

/// Volume-weighted average: `notional_micros / qty`, rounded half away from
/// zero.
pub fn average_micros(notional_micros: i128, qty: i64) -> Result<i64, PricingError> {
    if qty == 0 {
        return Err(PricingError::ZeroQuantity);
    }
    let q = qty as i128;
    let half = q.abs() / 2;
    let adjusted = if (notional_micros >= 0) == (q > 0) {
        notional_micros + half * q.signum()
    } else {
        notional_micros - half * q.signum()
    };
    i64::try_from(adjusted / q).map_err(|_| PricingError::OutOfRange)
}
