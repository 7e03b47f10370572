//! bks-notion
//!
//! Notion REST adapter:
//! - [`NotionStore`]: a database as a paginated [`bks_reconcile::RecordStore`]
//! - [`NotionSummaryBlock`]: the account-summary code block as a
//!   [`bks_reconcile::DocumentPublisher`]
//!
//! Every failure is mapped onto [`bks_reconcile::StoreError`]; nothing here
//! retries.

mod client;
mod properties;
mod store;
mod summary;

pub use client::NotionClient;
pub use store::NotionStore;
pub use summary::{find_code_block_after_heading, NotionSummaryBlock};
