use std::path::{Path, PathBuf};

use crate::SteamError;

/// Returns the Steam base directory on Linux.
pub(crate) fn get_base_dir() -> Result<PathBuf, SteamError> {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or(SteamError::NotFound)?;
    find_base_dir(&home).ok_or(SteamError::NotFound)
}

/// Probes the known install locations under `home`, in order.
pub fn find_base_dir(home: &Path) -> Option<PathBuf> {
    candidates(home).into_iter().find(|dir| dir.exists())
}

fn candidates(home: &Path) -> Vec<PathBuf> {
    vec![
        // Primary location: ~/.steam/steam
        home.join(".steam").join("steam"),
        home.join(".local").join("share").join("Steam"),
        // Flatpak
        home.join(".var")
            .join("app")
            .join("com.valvesoftware.Steam")
            .join(".steam")
            .join("steam"),
        // Snap
        home.join("snap")
            .join("steam")
            .join("common")
            .join(".local")
            .join("share")
            .join("Steam"),
    ]
}
