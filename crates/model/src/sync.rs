use serde::{Deserialize, Serialize};

use crate::store::StoreId;

/// What happened to one store during a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreOutcome {
    /// Games were listed and persisted.
    Synced,
    /// Helper tool missing. Not an error.
    Unavailable,
    /// No valid credentials and no silent refresh possible.
    Unauthenticated,
    /// Listing failed; an entry was added to [`SyncResult::errors`].
    Failed,
    /// Abandoned because the pass was cancelled.
    Cancelled,
}

/// Per-store line of a [`SyncResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSyncReport {
    pub store: StoreId,
    pub outcome: StoreOutcome,
    /// Records from this store that were persisted.
    pub synced: usize,
    /// Records that failed to persist.
    pub failed_records: usize,
}

impl StoreSyncReport {
    pub fn new(store: StoreId, outcome: StoreOutcome) -> Self {
        Self {
            store,
            outcome,
            synced: 0,
            failed_records: 0,
        }
    }
}

/// Aggregate outcome of one sync pass. Field names are snake_case on the
/// wire (`total_synced`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub total_synced: usize,
    /// `"<store>: <reason>"`, one entry per failed store. Empty on success.
    pub errors: Vec<String>,
    /// Informational entries (e.g. a store without credentials).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<String>,
    #[serde(default)]
    pub stores: Vec<StoreSyncReport>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub duration_ms: u64,
}

impl SyncResult {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && !self.cancelled
    }

    /// Returns the report for one store, if it took part in the pass.
    pub fn store(&self, store: StoreId) -> Option<&StoreSyncReport> {
        self.stores.iter().find(|r| r.store == store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_snake_case_fields() {
        let result = SyncResult {
            total_synced: 3,
            errors: vec!["gog: malformed output".into()],
            ..Default::default()
        };
        let mut report = StoreSyncReport::new(StoreId::Gog, StoreOutcome::Failed);
        report.failed_records = 1;
        let result = SyncResult {
            stores: vec![report],
            duration_ms: 12,
            ..result
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["total_synced"], 3);
        assert!(value.get("totalSynced").is_none());
        assert_eq!(value["duration_ms"], 12);
        assert_eq!(value["stores"][0]["failed_records"], 1);
        assert_eq!(value["stores"][0]["outcome"], "failed");
        assert_eq!(value["errors"][0], "gog: malformed output");
        assert!(value.get("notices").is_none());
    }

    #[test]
    fn store_lookup() {
        let mut result = SyncResult::default();
        result
            .stores
            .push(StoreSyncReport::new(StoreId::Steam, StoreOutcome::Unavailable));
        assert_eq!(
            result.store(StoreId::Steam).map(|r| r.outcome),
            Some(StoreOutcome::Unavailable)
        );
        assert!(result.store(StoreId::Epic).is_none());
        assert!(result.is_clean());
    }
}
