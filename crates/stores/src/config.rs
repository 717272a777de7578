//! Per-store settings, embedded in the launcher's config file.

use std::path::PathBuf;

use pixxiden_model::StoreId;
use serde::{Deserialize, Serialize};

/// Settings for one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Explicit helper binary; otherwise Heroic's or `PATH`'s is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<PathBuf>,

    /// Helper config location (legendary/nile config dir, gogdl auth file).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            binary: None,
            config_path: None,
        }
    }
}

/// Settings for every store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoresConfig {
    #[serde(default)]
    pub epic: StoreSettings,
    #[serde(default)]
    pub gog: StoreSettings,
    #[serde(default)]
    pub amazon: StoreSettings,
    /// `binary` overrides the `steam` client used for launch/install;
    /// `config_path` overrides the Steam root directory.
    #[serde(default)]
    pub steam: StoreSettings,
}

impl StoresConfig {
    pub fn get(&self, store: StoreId) -> &StoreSettings {
        match store {
            StoreId::Epic => &self.epic,
            StoreId::Gog => &self.gog,
            StoreId::Amazon => &self.amazon,
            StoreId::Steam => &self.steam,
        }
    }

    pub fn get_mut(&mut self, store: StoreId) -> &mut StoreSettings {
        match store {
            StoreId::Epic => &mut self.epic,
            StoreId::Gog => &mut self.gog,
            StoreId::Amazon => &mut self.amazon,
            StoreId::Steam => &mut self.steam,
        }
    }

    pub fn is_enabled(&self, store: StoreId) -> bool {
        self.get(store).enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default_to_enabled() {
        let cfg: StoresConfig =
            serde_json::from_str(r#"{"gog": {"enabled": false}, "epic": {}}"#).unwrap();
        assert!(cfg.is_enabled(StoreId::Epic));
        assert!(!cfg.is_enabled(StoreId::Gog));
        assert!(cfg.is_enabled(StoreId::Steam));
        assert_eq!(cfg.get(StoreId::Amazon).binary, None);
    }
}
