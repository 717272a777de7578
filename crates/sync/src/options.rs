use pixxiden_model::StoreId;
use serde::{Deserialize, Serialize};

/// Per-pass knobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Stores to sync; `None` means every registered store.
    pub stores: Option<Vec<StoreId>>,
    /// Skip metadata enrichment entirely.
    pub skip_enrichment: bool,
    /// Re-enrich games that were enriched by an earlier pass.
    pub force_enrich: bool,
}

impl SyncOptions {
    pub fn only(stores: impl IntoIterator<Item = StoreId>) -> Self {
        Self {
            stores: Some(stores.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn includes(&self, store: StoreId) -> bool {
        self.stores.as_ref().is_none_or(|s| s.contains(&store))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_includes_every_store() {
        let all = SyncOptions::default();
        assert!(StoreId::all().iter().all(|s| all.includes(*s)));

        let gog = SyncOptions::only([StoreId::Gog]);
        assert!(gog.includes(StoreId::Gog));
        assert!(!gog.includes(StoreId::Steam));
        assert!(!SyncOptions::only([]).includes(StoreId::Epic));
    }
}
