use pixxiden_model::{StoreId, StoreOutcome};
use serde::Serialize;

/// Progress of a sync pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    Started {
        stores: usize,
    },
    StoreStarted {
        store: StoreId,
    },
    StoreFinished {
        store: StoreId,
        outcome: StoreOutcome,
        games: usize,
    },
    Finished {
        total_synced: usize,
        errors: usize,
        cancelled: bool,
    },
}
