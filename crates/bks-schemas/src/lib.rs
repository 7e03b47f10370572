//! bks-schemas
//!
//! Shared record types for the brokerage → external-store synchronization
//! engine, the integer-micros price helpers, and the `Session` capability the
//! engine consumes.
//!
//! Nothing here performs I/O. Adapters (paper session, Notion, Sheets) and the
//! pure logic crates depend on this crate; it depends on none of them.

pub mod prices;
pub mod session;
mod types;

pub use prices::{
    average_micros, micros_to_price, mul_qty_micros, price_to_micros, PricingError, MICROS_PER_UNIT,
};
pub use session::{MarginImpact, PriceWindow, Session, SessionConnector, SessionError, SessionTrade};
pub use types::*;
