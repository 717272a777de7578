//! Installed-app discovery across every Steam library folder.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::SteamError;
use crate::paths::Paths;
use crate::vdf::{VdfNode, load_vdf, parse_vdf};

/// Steamworks Common Redistributables.
const STEAMWORKS_REDIST: u32 = 228980;

/// Compatibility tools and runtimes that show up as installed apps.
const RUNTIME_APP_IDS: &[u32] = &[
    STEAMWORKS_REDIST,
    1070560, // Steam Linux Runtime 1.0 (scout)
    1391110, // Steam Linux Runtime 2.0 (soldier)
    1628350, // Steam Linux Runtime 3.0 (sniper)
    1493710, // Proton Experimental
    2180100, // Proton Hotfix
];

const RUNTIME_NAME_PREFIXES: &[&str] = &[
    "Proton",
    "Steam Linux Runtime",
    "Steamworks Common Redistributables",
];

/// `StateFlags` bit set once an app is fully installed.
const STATE_FULLY_INSTALLED: u32 = 4;

/// One Steam library root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryFolder {
    pub path: PathBuf,
    /// App ids the library claims to hold (may be empty on old clients).
    pub app_ids: Vec<u32>,
}

/// Parsed appmanifest_<id>.acf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppManifest {
    pub app_id: u32,
    pub name: String,
    pub install_dir: String,
    pub library_path: PathBuf,
    pub state_flags: u32,
    pub size_on_disk: Option<u64>,
    /// Unix seconds.
    pub last_updated: Option<u64>,
    /// Unix seconds; absent or zero when never played.
    pub last_played: Option<u64>,
}

impl AppManifest {
    pub fn full_install_path(&self) -> PathBuf {
        self.library_path
            .join("steamapps")
            .join("common")
            .join(&self.install_dir)
    }

    pub fn is_fully_installed(&self) -> bool {
        self.state_flags & STATE_FULLY_INSTALLED != 0
    }
}

/// True for Proton, runtimes and redistributables.
pub fn is_runtime_tool(app_id: u32, name: &str) -> bool {
    RUNTIME_APP_IDS.contains(&app_id)
        || RUNTIME_NAME_PREFIXES
            .iter()
            .any(|prefix| name.starts_with(prefix))
}

/// Lists library roots from libraryfolders.vdf.
///
/// The base directory is always included, first.
pub fn library_folders(paths: &Paths) -> Result<Vec<LibraryFolder>, SteamError> {
    let mut folders = vec![LibraryFolder {
        path: paths.base_dir().clone(),
        app_ids: Vec::new(),
    }];

    let vdf_path = paths.library_folders_path();
    if !vdf_path.exists() {
        debug!(path = %vdf_path.display(), "no libraryfolders.vdf, using base dir only");
        return Ok(folders);
    }

    let root = load_vdf(&vdf_path)?;
    let Some(list) = root.get("libraryfolders") else {
        return Err(SteamError::Vdf("missing libraryfolders root".into()));
    };

    for (key, entry) in list.entries() {
        if key.parse::<u32>().is_err() {
            continue;
        }
        let folder = match entry {
            // Pre-2021 format: "1" "/path/to/library"
            VdfNode::Str(path) => LibraryFolder {
                path: PathBuf::from(path),
                app_ids: Vec::new(),
            },
            VdfNode::Map(_) => {
                let Some(path) = entry.get_str("path") else {
                    continue;
                };
                let app_ids: Vec<u32> = entry
                    .get("apps")
                    .map(|apps| apps.entries().filter_map(|(id, _)| id.parse().ok()).collect())
                    .unwrap_or_default();
                LibraryFolder {
                    path: PathBuf::from(path),
                    app_ids,
                }
            }
        };

        if let Some(existing) = folders.iter_mut().find(|f| same_dir(&f.path, &folder.path)) {
            existing.app_ids = folder.app_ids;
        } else {
            folders.push(folder);
        }
    }

    Ok(folders)
}

/// Returns every installed game across all libraries, runtimes excluded.
///
/// Unreadable manifests are logged and skipped.
pub fn installed_apps(paths: &Paths) -> Result<Vec<AppManifest>, SteamError> {
    let mut apps = Vec::new();

    for folder in library_folders(paths)? {
        let steamapps = folder.path.join("steamapps");
        let entries = match fs::read_dir(&steamapps) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(library = %folder.path.display(), error = %e, "skipping unreadable library");
                continue;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !(name.starts_with("appmanifest_") && name.ends_with(".acf")) {
                continue;
            }

            let path = entry.path();
            let manifest = match fs::read_to_string(&path)
                .map_err(|e| SteamError::Io(e.to_string()))
                .and_then(|text| parse_manifest(&text, &folder.path))
            {
                Ok(m) => m,
                Err(e) => {
                    warn!(manifest = %path.display(), error = %e, "skipping bad app manifest");
                    continue;
                }
            };

            if is_runtime_tool(manifest.app_id, &manifest.name) {
                continue;
            }
            if apps.iter().any(|a: &AppManifest| a.app_id == manifest.app_id) {
                continue;
            }
            apps.push(manifest);
        }
    }

    apps.sort_by_key(|a| a.app_id);
    Ok(apps)
}

/// Parses the text of an appmanifest_*.acf file.
pub fn parse_manifest(text: &str, library_path: &Path) -> Result<AppManifest, SteamError> {
    let root = parse_vdf(text)?;
    let state = root
        .get("AppState")
        .ok_or_else(|| SteamError::Vdf("missing AppState".into()))?;

    let app_id = state
        .get_str("appid")
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(|| SteamError::Vdf("missing or invalid appid".into()))?;
    let name = state
        .get_str("name")
        .filter(|n| !n.is_empty())
        .ok_or_else(|| SteamError::Vdf(format!("app {app_id} has no name")))?;

    let number = |key: &str| state.get_str(key).and_then(|s| s.parse::<u64>().ok());

    Ok(AppManifest {
        app_id,
        name: name.to_string(),
        install_dir: state.get_str("installdir").unwrap_or_default().to_string(),
        library_path: library_path.to_path_buf(),
        state_flags: number("StateFlags").unwrap_or(0) as u32,
        size_on_disk: number("SizeOnDisk"),
        last_updated: number("LastUpdated"),
        last_played: number("LastPlayed").filter(|&t| t > 0),
    })
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
