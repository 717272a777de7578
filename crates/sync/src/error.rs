use pixxiden_db::DbError;
use thiserror::Error;

/// Whole-pass failures. Per-store problems land in the result instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("a sync is already running")]
    AlreadyRunning,

    #[error("persistence unavailable: {0}")]
    Persistence(#[from] DbError),
}
