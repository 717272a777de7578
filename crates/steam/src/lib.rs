pub mod library;
pub mod paths;
#[cfg(target_os = "linux")]
pub mod paths_linux;
pub mod users;
pub mod vdf;

// Re-export primary types.
pub use library::{AppManifest, LibraryFolder, installed_apps, is_runtime_tool, library_folders};
pub use paths::Paths;
pub use users::{LoginUser, active_account, login_users};
pub use vdf::{VdfNode, parse_vdf};

/// Errors for Steam operations.
#[derive(Debug, thiserror::Error)]
pub enum SteamError {
    #[error("steam installation not found")]
    NotFound,

    #[error("VDF parse error: {0}")]
    Vdf(String),

    #[error("I/O error: {0}")]
    Io(String),
}
