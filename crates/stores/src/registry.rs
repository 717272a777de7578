use std::sync::Arc;

use pixxiden_model::{StoreId, StoreStatus};
use pixxiden_sidecar::SidecarRunner;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::adapter::StoreAdapter;
use crate::config::StoresConfig;
use crate::gogdl::GogdlAdapter;
use crate::legendary::LegendaryAdapter;
use crate::nile::NileAdapter;
use crate::steam::SteamAdapter;

/// Fixed set of adapters, built once at startup.
#[derive(Clone, Default)]
pub struct StoreRegistry {
    adapters: Vec<Arc<dyn StoreAdapter>>,
}

impl StoreRegistry {
    pub fn new(adapters: Vec<Arc<dyn StoreAdapter>>) -> Self {
        Self { adapters }
    }

    /// Builds the enabled stores, in [`StoreId::all`] order.
    pub fn from_config(config: &StoresConfig, runner: SidecarRunner) -> Self {
        let mut adapters: Vec<Arc<dyn StoreAdapter>> = Vec::new();
        for &id in StoreId::all() {
            let settings = config.get(id);
            if !settings.enabled {
                info!(store = %id, "store disabled in config");
                continue;
            }
            let runner = runner.clone();
            let adapter: Arc<dyn StoreAdapter> = match id {
                StoreId::Epic => Arc::new(LegendaryAdapter::from_settings(settings, runner)),
                StoreId::Gog => Arc::new(GogdlAdapter::from_settings(settings, runner)),
                StoreId::Amazon => Arc::new(NileAdapter::from_settings(settings, runner)),
                StoreId::Steam => Arc::new(SteamAdapter::from_settings(settings, runner)),
            };
            adapters.push(adapter);
        }
        Self { adapters }
    }

    pub fn get(&self, id: StoreId) -> Option<&Arc<dyn StoreAdapter>> {
        self.adapters.iter().find(|a| a.id() == id)
    }

    pub fn adapters(&self) -> &[Arc<dyn StoreAdapter>] {
        &self.adapters
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Computes a fresh descriptor for every registered store, concurrently.
    pub async fn status(&self) -> Vec<StoreStatus> {
        let mut set = JoinSet::new();
        for (idx, adapter) in self.adapters.iter().enumerate() {
            let adapter = Arc::clone(adapter);
            set.spawn(async move { (idx, adapter.status().await) });
        }

        let mut out = Vec::with_capacity(self.adapters.len());
        while let Some(res) = set.join_next().await {
            match res {
                Ok(entry) => out.push(entry),
                Err(e) => warn!(error = %e, "store status task failed"),
            }
        }
        out.sort_by_key(|(idx, _)| *idx);
        out.into_iter().map(|(_, status)| status).collect()
    }
}
