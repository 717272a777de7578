use std::path::{Path, PathBuf};

use crate::SteamError;

/// Provides access to Steam directory paths.
#[derive(Debug, Clone)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Creates a new `Paths` instance with auto-detected Steam directory.
    pub fn new() -> Result<Self, SteamError> {
        let base_dir = get_base_dir()?;
        Ok(Self { base_dir })
    }

    /// Creates a new `Paths` instance with a custom base directory.
    pub fn with_base(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Uses `base_dir` when given, otherwise auto-detects.
    pub fn resolve(base_dir: Option<&Path>) -> Result<Self, SteamError> {
        match base_dir {
            Some(dir) if dir.exists() => Ok(Self::with_base(dir)),
            Some(_) => Err(SteamError::NotFound),
            None => Self::new(),
        }
    }

    /// Returns the Steam base directory.
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Returns the global config directory.
    pub fn config_dir(&self) -> PathBuf {
        self.base_dir.join("config")
    }

    /// Returns the path to loginusers.vdf.
    pub fn login_users_path(&self) -> PathBuf {
        self.config_dir().join("loginusers.vdf")
    }

    /// Returns the steamapps directory of the primary library.
    pub fn steamapps_dir(&self) -> PathBuf {
        self.base_dir.join("steamapps")
    }

    /// Returns the path to libraryfolders.vdf.
    pub fn library_folders_path(&self) -> PathBuf {
        self.steamapps_dir().join("libraryfolders.vdf")
    }
}

/// Returns the manifest path for an app inside a library root.
pub fn manifest_path(library_root: &Path, app_id: u32) -> PathBuf {
    library_root
        .join("steamapps")
        .join(format!("appmanifest_{app_id}.acf"))
}

// Platform-specific base directory detection.
#[cfg(target_os = "linux")]
fn get_base_dir() -> Result<PathBuf, SteamError> {
    crate::paths_linux::get_base_dir()
}

#[cfg(not(target_os = "linux"))]
fn get_base_dir() -> Result<PathBuf, SteamError> {
    Err(SteamError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_with_base() {
        let paths = Paths::with_base("/tmp/steam");
        assert_eq!(paths.base_dir(), &PathBuf::from("/tmp/steam"));
        assert_eq!(
            paths.login_users_path(),
            PathBuf::from("/tmp/steam/config/loginusers.vdf")
        );
        assert_eq!(
            paths.library_folders_path(),
            PathBuf::from("/tmp/steam/steamapps/libraryfolders.vdf")
        );
    }

    #[test]
    fn manifest_path_layout() {
        assert_eq!(
            manifest_path(Path::new("/mnt/sd"), 1145360),
            PathBuf::from("/mnt/sd/steamapps/appmanifest_1145360.acf")
        );
    }

    #[test]
    fn resolve_rejects_missing_override() {
        assert!(matches!(
            Paths::resolve(Some(Path::new("/nonexistent/steam"))),
            Err(SteamError::NotFound)
        ));

        let tmp = tempfile::tempdir().unwrap();
        let paths = Paths::resolve(Some(tmp.path())).unwrap();
        assert_eq!(paths.base_dir(), &tmp.path().to_path_buf());
    }
}
