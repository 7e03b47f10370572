//! bks-sheets
//!
//! Google Sheets values-API adapter implementing
//! [`bks_reconcile::RecordStore`] for the trade log.

mod a1;
mod store;

pub use store::SheetsStore;
