//! GOG via `gogdl` plus the GOG embed API.
//!
//! gogdl is only a downloader: it owns the credentials and installs games,
//! but the owned library comes from `embed.gog.com` using gogdl's token.
//! Install locations are kept in a Heroic-compatible `installed.json`.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pixxiden_model::{StoreGame, StoreId};
use pixxiden_sidecar::{SidecarCommand, SidecarRunner};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::adapter::{AuthRequest, BoxFuture, InstallProgress, InteractiveAuth, StoreAdapter};
use crate::config::StoreSettings;
use crate::error::StoreError;
use crate::helper::{Helper, parse_json};
use crate::locate;

pub const GOG_CLIENT_ID: &str = "46899977096215655";
pub const GOG_AUTH_URL: &str = "https://auth.gog.com/auth?client_id=46899977096215655&redirect_uri=https%3A%2F%2Fembed.gog.com%2Fon_login_success%3Forigin%3Dclient&response_type=code&layout=client2";
pub const GOG_REDIRECT_PREFIX: &str = "https://embed.gog.com/on_login_success";
pub const GOG_API_BASE: &str = "https://embed.gog.com";

const MAX_PAGES: u32 = 100;
const LAUNCH_SCRIPTS: &[&str] = &["start.sh", "launch.sh", "game.sh"];

// ---------------------------------------------------------------------------
// Credentials (gogdl auth config)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct Credentials {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<f64>,
    #[serde(default, rename = "loginTime")]
    login_time: Option<f64>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl Credentials {
    fn has_tokens(&self) -> bool {
        let present = |t: &Option<String>| t.as_deref().is_some_and(|t| !t.is_empty());
        present(&self.access_token) && present(&self.refresh_token)
    }

    fn is_expired(&self, now: f64) -> bool {
        match (self.login_time, self.expires_in) {
            (Some(login), Some(expires)) => login + expires <= now,
            _ => false,
        }
    }
}

/// Reads gogdl's auth file, which maps client ids to credentials.
fn read_credentials(path: &Path) -> Option<Credentials> {
    let text = std::fs::read_to_string(path).ok()?;
    let mut map: HashMap<String, Credentials> = serde_json::from_str(&text).ok()?;
    map.remove(GOG_CLIENT_ID)
}

fn now_secs() -> f64 {
    chrono::Utc::now().timestamp() as f64
}

// ---------------------------------------------------------------------------
// Installed games (Heroic gog_store/installed.json)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct InstalledFile {
    #[serde(default)]
    installed: Vec<InstalledEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InstalledEntry {
    #[serde(rename = "appName")]
    app_name: String,
    install_path: String,
    #[serde(default)]
    platform: Option<String>,
    /// Fields written by Heroic that we must preserve.
    #[serde(flatten)]
    extra: serde_json::Map<String, serde_json::Value>,
}

/// A missing manifest means nothing is installed; an unreadable one is
/// an error.
fn read_installed(path: &Path) -> Result<Vec<InstalledEntry>, StoreError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str::<InstalledFile>(&text)
        .map(|file| file.installed)
        .map_err(|e| StoreError::malformed(format!("{}: {e}", path.display())))
}

fn write_installed(path: &Path, entries: Vec<InstalledEntry>) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&InstalledFile { installed: entries })
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Finds something runnable in a GOG install directory.
fn find_executable(install_path: &Path) -> Option<PathBuf> {
    for script in LAUNCH_SCRIPTS {
        let candidate = install_path.join(script);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    // Windows builds: first .exe at the top level.
    std::fs::read_dir(install_path)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .find(|p| {
            p.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("exe"))
        })
}

// ---------------------------------------------------------------------------
// Library API
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductsPage {
    #[serde(default)]
    total_pages: u32,
    #[serde(default)]
    products: Vec<Product>,
}

#[derive(Debug, Deserialize)]
struct Product {
    id: serde_json::Value,
    title: String,
    #[serde(default)]
    image: Option<String>,
}

fn product_id(id: &serde_json::Value) -> Option<String> {
    match id {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// With `installed` unknown the install fields stay unset.
fn normalize(product: Product, installed: Option<&[InstalledEntry]>) -> Option<StoreGame> {
    let id = product_id(&product.id)?;
    let mut game = StoreGame::new(StoreId::Gog, id, product.title);
    game.cover_url = product
        .image
        .filter(|i| !i.is_empty())
        .map(|i| format!("https:{i}_392.jpg"));

    let Some(installed) = installed else {
        return Some(game);
    };
    match installed.iter().find(|e| e.app_name == game.store_id) {
        Some(entry) => {
            game.installed = Some(true);
            game.install_path = Some(entry.install_path.clone());
            game.executable_path =
                find_executable(Path::new(&entry.install_path)).map(|p| p.display().to_string());
        }
        None => game.installed = Some(false),
    }
    Some(game)
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

pub struct GogdlAdapter {
    helper: Helper,
    auth_config: PathBuf,
    installed_manifest: PathBuf,
    install_base: PathBuf,
    api_base: String,
    http: reqwest::Client,
    request_timeout: Duration,
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "could not build GOG http client, using defaults");
            reqwest::Client::new()
        })
}

impl GogdlAdapter {
    pub fn new(
        runner: SidecarRunner,
        binary: Option<PathBuf>,
        auth_config: PathBuf,
        installed_manifest: PathBuf,
    ) -> Self {
        info!(binary = ?binary, auth_config = %auth_config.display(), "gogdl adapter configured");
        let request_timeout = runner.default_timeout();
        let install_base = locate::home_dir()
            .map(|h| h.join("Games").join("GOG"))
            .unwrap_or_else(|| PathBuf::from("Games/GOG"));
        Self {
            helper: Helper::new("gogdl", runner, binary),
            auth_config,
            installed_manifest,
            install_base,
            api_base: GOG_API_BASE.to_string(),
            http: http_client(request_timeout),
            request_timeout,
        }
    }

    pub fn from_settings(settings: &StoreSettings, runner: SidecarRunner) -> Self {
        let home = locate::home_dir().unwrap_or_default();
        let binary = locate::find_binary("gogdl", settings.binary.as_deref());
        let auth_config = settings
            .config_path
            .clone()
            .unwrap_or_else(|| locate::gogdl_auth_config(&home));
        Self::new(runner, binary, auth_config, locate::gog_installed_manifest(&home))
    }

    /// Points library requests at another host.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_install_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.install_base = base.into();
        self
    }

    fn command<I, S>(&self, args: I) -> Result<SidecarCommand, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Ok(self
            .helper
            .command([OsStr::new("--auth-config-path"), self.auth_config.as_os_str()])?
            .args(args))
    }

    /// `gogdl auth` refreshes the stored tokens if needed and prints them.
    async fn access_token(&self) -> Result<String, StoreError> {
        let cmd = self.command(["auth"])?;
        let creds: Credentials = self.helper.run_json(&cmd).await?;
        if creds.error.as_ref().is_some_and(|e| e != &serde_json::Value::Bool(false)) {
            return Err(StoreError::Auth("gogdl reported an auth error".into()));
        }
        creds
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| StoreError::Auth("no access token".into()))
    }

    /// One library page, bounded by the runner's default timeout even when
    /// the injected client has none.
    async fn fetch_page(&self, token: &str, page: u32) -> Result<ProductsPage, StoreError> {
        let secs = self.request_timeout.as_secs();
        let http_err = |e: reqwest::Error| {
            if e.is_timeout() {
                StoreError::Timeout(secs)
            } else {
                e.into()
            }
        };
        let url = format!(
            "{}/account/getFilteredProducts?mediaType=1&page={page}",
            self.api_base.trim_end_matches('/')
        );
        let request = async {
            let resp = self
                .http
                .get(&url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(http_err)?;
            let status = resp.status();
            if !status.is_success() {
                return Err(StoreError::Http(format!("GOG API returned {status}")));
            }
            resp.text().await.map_err(http_err)
        };
        let body = match tokio::time::timeout(self.request_timeout, request).await {
            Ok(body) => body?,
            Err(_) => {
                warn!(page, secs, "GOG API request timed out");
                return Err(StoreError::Timeout(secs));
            }
        };
        parse_json("gog api", &body)
    }

    fn installed_entry(&self, app_id: &str) -> Result<Option<InstalledEntry>, StoreError> {
        Ok(read_installed(&self.installed_manifest)?
            .into_iter()
            .find(|e| e.app_name == app_id))
    }
}

impl StoreAdapter for GogdlAdapter {
    fn id(&self) -> StoreId {
        StoreId::Gog
    }

    fn is_available(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.helper.is_available() })
    }

    fn is_authenticated(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            read_credentials(&self.auth_config)
                .is_some_and(|c| c.has_tokens() && !c.is_expired(now_secs()))
        })
    }

    fn refresh_auth(&self) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(async move {
            let has_refresh = read_credentials(&self.auth_config)
                .is_some_and(|c| c.refresh_token.is_some_and(|t| !t.is_empty()));
            if !has_refresh {
                return Ok(false);
            }
            match self.access_token().await {
                Ok(_) => Ok(true),
                Err(StoreError::Auth(reason)) => {
                    debug!(%reason, "gog token refresh rejected");
                    Ok(false)
                }
                Err(e) => Err(e),
            }
        })
    }

    fn list_games(&self) -> BoxFuture<'_, Result<Vec<StoreGame>, StoreError>> {
        Box::pin(async move {
            let token = self.access_token().await?;
            let installed = match read_installed(&self.installed_manifest) {
                Ok(entries) => Some(entries),
                Err(e) => {
                    warn!(error = %e, "could not read GOG installed list, install state left unchanged");
                    None
                }
            };

            let mut games = Vec::new();
            let mut page = 1;
            loop {
                let resp = self.fetch_page(&token, page).await?;
                games.extend(
                    resp.products
                        .into_iter()
                        .filter_map(|p| normalize(p, installed.as_deref())),
                );
                if page >= resp.total_pages.min(MAX_PAGES) {
                    break;
                }
                page += 1;
            }

            info!(
                count = games.len(),
                installed = ?installed.as_ref().map(Vec::len),
                "gog library listed"
            );
            Ok(games)
        })
    }

    fn install<'a>(
        &'a self,
        app_id: &'a str,
        path: Option<&'a Path>,
        progress: Option<mpsc::Sender<InstallProgress>>,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let target = path
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.install_base.clone())
                .join(app_id);
            let cmd = self
                .command(["download", app_id, "--platform", "linux", "--path"])?
                .arg(&target);
            self.helper.run_install(cmd, app_id, progress).await?;

            // gogdl unpacks into a single game folder under the target.
            let install_path = match std::fs::read_dir(&target) {
                Ok(entries) => {
                    let dirs: Vec<PathBuf> = entries
                        .flatten()
                        .map(|e| e.path())
                        .filter(|p| p.is_dir())
                        .collect();
                    match dirs.as_slice() {
                        [only] => only.clone(),
                        _ => target.clone(),
                    }
                }
                Err(_) => target.clone(),
            };

            let mut entries = read_installed(&self.installed_manifest)?;
            entries.retain(|e| e.app_name != app_id);
            entries.push(InstalledEntry {
                app_name: app_id.to_string(),
                install_path: install_path.display().to_string(),
                platform: Some("linux".into()),
                extra: serde_json::Map::new(),
            });
            write_installed(&self.installed_manifest, entries)?;
            info!(app_id, path = %install_path.display(), "gog game installed");
            Ok(())
        })
    }

    fn uninstall<'a>(&'a self, app_id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let entry = self
                .installed_entry(app_id)?
                .ok_or_else(|| StoreError::NotInstalled(app_id.to_string()))?;

            let dir = PathBuf::from(&entry.install_path);
            if dir.exists() {
                tokio::fs::remove_dir_all(&dir).await?;
            } else {
                warn!(app_id, path = %dir.display(), "install directory already gone");
            }
            // install() nests the game folder under `<base>/<app_id>`.
            let app_folder = dir
                .parent()
                .filter(|p| p.file_name() == Some(OsStr::new(app_id)));
            if let Some(parent) = app_folder {
                match tokio::fs::remove_dir(parent).await {
                    Ok(()) => debug!(app_id, path = %parent.display(), "removed install folder"),
                    Err(e) => debug!(app_id, path = %parent.display(), error = %e, "install folder kept"),
                }
            }

            let mut entries = read_installed(&self.installed_manifest)?;
            entries.retain(|e| e.app_name != app_id);
            write_installed(&self.installed_manifest, entries)?;
            Ok(())
        })
    }

    fn launch<'a>(&'a self, app_id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let entry = self
                .installed_entry(app_id)?
                .ok_or_else(|| StoreError::NotInstalled(app_id.to_string()))?;
            let dir = PathBuf::from(&entry.install_path);
            let exe = find_executable(&dir)
                .ok_or_else(|| StoreError::NotInstalled(format!("{app_id}: no executable")))?;
            if exe.extension().is_some_and(|e| e.eq_ignore_ascii_case("exe")) {
                return Err(StoreError::Unsupported(
                    "windows builds need a compatibility layer".into(),
                ));
            }
            let cmd = SidecarCommand::new(exe).current_dir(dir);
            self.helper.launch_detached(&cmd).await
        })
    }

    fn interactive_auth(&self) -> Option<&dyn InteractiveAuth> {
        Some(self)
    }
}

impl InteractiveAuth for GogdlAdapter {
    fn begin_auth(&self) -> BoxFuture<'_, Result<AuthRequest, StoreError>> {
        Box::pin(async {
            Ok(AuthRequest {
                url: GOG_AUTH_URL.to_string(),
                redirect_prefix: GOG_REDIRECT_PREFIX.to_string(),
                code_param: "code".to_string(),
                title: "GOG Login".to_string(),
            })
        })
    }

    fn complete_auth<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            if let Some(parent) = self.auth_config.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let cmd = self.command(["auth", "--code", code])?;
            let out = self.helper.output(&cmd).await?;
            if !out.success() {
                return Err(StoreError::Auth(out.stderr.trim().to_string()));
            }
            Ok(())
        })
    }
}
