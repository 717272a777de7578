//! Sync orchestrator.
//!
//! One pass lists every registered store (bounded parallel), folds the
//! records, upserts them and reports per-store results. A failing store
//! never aborts the pass; only an unreachable database does.

pub mod enrich;
pub mod error;
pub mod event;
pub mod options;
pub mod orchestrator;

pub use enrich::{EnrichError, Enricher};
pub use error::SyncError;
pub use event::SyncEvent;
pub use options::SyncOptions;
pub use orchestrator::{DEFAULT_MAX_CONCURRENT_STORES, SyncOrchestrator};
