//! Helper binary and config directory discovery.
//!
//! Heroic ships the same helpers we drive, so its bundled binaries and
//! config directories are preferred over a system install.

use std::path::{Path, PathBuf};

const HEROIC_BUNDLED_BIN: &str = "/opt/Heroic/resources/app.asar.unpacked/build/bin/x64/linux";
const HEROIC_FLATPAK: &str = ".var/app/com.heroicgameslauncher.hgl/config";

pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Candidate locations for a helper, in search order, excluding `PATH`.
pub fn binary_candidates(tool: &str, home: Option<&Path>) -> Vec<PathBuf> {
    let mut out = vec![Path::new(HEROIC_BUNDLED_BIN).join(tool)];
    if let Some(home) = home {
        out.push(
            home.join(HEROIC_FLATPAK)
                .join("heroic/tools")
                .join(tool)
                .join(tool),
        );
    }
    out
}

/// Resolves a helper binary: explicit override, Heroic bundled, Heroic
/// Flatpak, then `PATH`.
pub fn find_binary(tool: &str, override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        return Some(path.to_path_buf());
    }
    binary_candidates(tool, home_dir().as_deref())
        .into_iter()
        .find(|p| is_executable(p))
        .or_else(|| find_in_path(tool))
}

pub fn find_in_path(tool: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(tool))
        .find(|p| is_executable(p))
}

#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn first_existing(candidates: Vec<PathBuf>) -> Option<PathBuf> {
    candidates.into_iter().find(|p| p.exists())
}

/// `LEGENDARY_CONFIG_PATH`: Heroic's, Heroic Flatpak's, then `~/.config/legendary`.
pub fn legendary_config_dir(home: &Path) -> PathBuf {
    first_existing(vec![
        home.join(".config/heroic/legendaryConfig/legendary"),
        home.join(HEROIC_FLATPAK).join("legendary"),
    ])
    .unwrap_or_else(|| home.join(".config/legendary"))
}

/// gogdl credentials file.
pub fn gogdl_auth_config(home: &Path) -> PathBuf {
    first_existing(vec![
        home.join(".config/heroic/gog_store/auth.json"),
        home.join(HEROIC_FLATPAK).join("heroic/gog_store/auth.json"),
    ])
    .unwrap_or_else(|| home.join(".config/pixxiden/gog/auth.json"))
}

/// Heroic's record of installed GOG games.
pub fn gog_installed_manifest(home: &Path) -> PathBuf {
    first_existing(vec![
        home.join(".config/heroic/gog_store/installed.json"),
        home.join(HEROIC_FLATPAK).join("heroic/gog_store/installed.json"),
    ])
    .unwrap_or_else(|| home.join(".config/pixxiden/gog/installed.json"))
}

/// `NILE_CONFIG_PATH`.
pub fn nile_config_dir(home: &Path) -> PathBuf {
    first_existing(vec![
        home.join(".config/heroic/nile_config/nile"),
        home.join(HEROIC_FLATPAK).join("heroic/nile_config/nile"),
    ])
    .unwrap_or_else(|| home.join(".config/nile"))
}
