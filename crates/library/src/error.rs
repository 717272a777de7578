use pixxiden_auth::AuthError;
use pixxiden_db::DbError;
use pixxiden_model::StoreId;
use pixxiden_stores::StoreError;
use pixxiden_sync::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("game not found: {0}")]
    GameNotFound(String),

    #[error("store {0} is disabled")]
    StoreDisabled(StoreId),

    #[error("{store}: {source}")]
    Store {
        store: StoreId,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("no login surface available")]
    NoWebviewHost,

    #[error(transparent)]
    Sync(#[from] SyncError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = LibraryError::Store {
            store: StoreId::Gog,
            source: StoreError::NotInstalled("g1".into()),
        };
        assert_eq!(err.to_string(), format!("gog: {}", StoreError::NotInstalled("g1".into())));
        assert_eq!(
            LibraryError::StoreDisabled(StoreId::Amazon).to_string(),
            "store amazon is disabled"
        );
        assert_eq!(
            LibraryError::from(SyncError::AlreadyRunning).to_string(),
            "a sync is already running"
        );
    }
}
