//! Deterministic doubles for scenario tests: an in-memory paginated record
//! store, a recording document publisher and a scripted brokerage session.
//! No network I/O.

mod session;
mod store;

pub use session::{fill, position, FailingConnector, ScriptedConnector, ScriptedSession, SessionCalls};
pub use store::{InMemoryStore, RecordingPublisher, StoreCounters, StoredRecord};
