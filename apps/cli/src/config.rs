//! Launcher configuration: `~/.config/pixxiden/config.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use pixxiden_stores::StoresConfig;
use serde::{Deserialize, Serialize};

const MAX_AUTH_TIMEOUT_SECS: u64 = 600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Defaults to `~/.config/pixxiden/pixxiden.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    pub sidecar_timeout_secs: u64,
    pub max_concurrent_stores: usize,
    pub auth_timeout_secs: u64,
    pub stores: StoresConfig,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            sidecar_timeout_secs: 120,
            max_concurrent_stores: 4,
            auth_timeout_secs: MAX_AUTH_TIMEOUT_SECS,
            stores: StoresConfig::default(),
        }
    }
}

impl LauncherConfig {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Missing file gives defaults; an unreadable one is logged and
    /// replaced by defaults.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<LauncherConfig>(&content) {
            Ok(config) => Ok(config),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse launcher config, using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        set_permissions_0600(path);
        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_base_dir()?.join("pixxiden").join("pixxiden.db")),
        }
    }

    pub fn sidecar_timeout(&self) -> Duration {
        Duration::from_secs(self.sidecar_timeout_secs.max(1))
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs.clamp(1, MAX_AUTH_TIMEOUT_SECS))
    }
}

fn set_permissions_0600(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

pub fn config_path() -> anyhow::Result<PathBuf> {
    Ok(config_base_dir()?.join("pixxiden").join("config.json"))
}

fn config_base_dir() -> anyhow::Result<PathBuf> {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    Ok(PathBuf::from(home).join(".config"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = LauncherConfig::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, LauncherConfig::default());
        assert_eq!(config.sidecar_timeout(), Duration::from_secs(120));
        assert_eq!(config.max_concurrent_stores, 4);
    }

    #[test]
    fn invalid_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(LauncherConfig::load_from(&path).unwrap(), LauncherConfig::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"max_concurrent_stores": 2, "stores": {"gog": {"enabled": false}}}"#,
        )
        .unwrap();

        let config = LauncherConfig::load_from(&path).unwrap();
        assert_eq!(config.max_concurrent_stores, 2);
        assert_eq!(config.sidecar_timeout_secs, 120);
        assert!(!config.stores.gog.enabled);
        assert!(config.stores.epic.enabled);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.json");
        let mut config = LauncherConfig {
            database_path: Some(dir.path().join("games.db")),
            ..Default::default()
        };
        config.stores.steam.config_path = Some("/srv/steam".into());
        config.save_to(&path).unwrap();

        assert_eq!(LauncherConfig::load_from(&path).unwrap(), config);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn auth_timeout_is_clamped() {
        let config = LauncherConfig {
            auth_timeout_secs: 7200,
            ..Default::default()
        };
        assert_eq!(config.auth_timeout(), Duration::from_secs(600));
    }
}
