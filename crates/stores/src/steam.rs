//! Steam, read from the local installation.
//!
//! There is no helper CLI to list a Steam library: installed games come
//! from the app manifests and login state from loginusers.vdf. Install,
//! uninstall and launch are handed to the Steam client.

use std::path::{Path, PathBuf};

use chrono::DateTime;
use pixxiden_model::{StoreGame, StoreId};
use pixxiden_sidecar::{SidecarCommand, SidecarRunner};
use pixxiden_steam::{AppManifest, Paths, SteamError};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::adapter::{BoxFuture, InstallProgress, StoreAdapter};
use crate::config::StoreSettings;
use crate::error::StoreError;
use crate::locate;

const STEAM_CDN: &str = "https://steamcdn-a.akamaihd.net/steam/apps";

pub struct SteamAdapter {
    runner: SidecarRunner,
    client: Option<PathBuf>,
    root: Option<PathBuf>,
}

impl SteamAdapter {
    /// `root` overrides Steam directory detection; `client` the `steam`
    /// executable used for launches.
    pub fn new(runner: SidecarRunner, client: Option<PathBuf>, root: Option<PathBuf>) -> Self {
        Self {
            runner,
            client,
            root,
        }
    }

    pub fn from_settings(settings: &StoreSettings, runner: SidecarRunner) -> Self {
        let client = settings
            .binary
            .clone()
            .or_else(|| locate::find_in_path("steam"));
        Self::new(runner, client, settings.config_path.clone())
    }

    fn paths(&self) -> Result<Paths, SteamError> {
        Paths::resolve(self.root.as_deref())
    }

    async fn client_call(&self, args: &[&str]) -> Result<(), StoreError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| StoreError::Spawn("steam client not found".into()))?;
        let cmd = SidecarCommand::new(client).args(args);
        let pid = self.runner.spawn_detached(&cmd).await?;
        debug!(?args, pid, "steam client call delegated");
        Ok(())
    }
}

fn steam_error(e: SteamError) -> StoreError {
    match e {
        SteamError::NotFound => StoreError::Spawn("steam installation not found".into()),
        SteamError::Vdf(reason) => StoreError::malformed(reason),
        SteamError::Io(reason) => StoreError::Io(std::io::Error::other(reason)),
    }
}

fn normalize(app: AppManifest) -> StoreGame {
    let mut game = StoreGame::new(StoreId::Steam, app.app_id.to_string(), app.name.clone());
    game.installed = Some(app.is_fully_installed());
    game.install_path = Some(app.full_install_path().display().to_string());
    game.last_played = app
        .last_played
        .and_then(|t| i64::try_from(t).ok())
        .and_then(|t| DateTime::from_timestamp(t, 0));
    game.cover_url = Some(format!("{STEAM_CDN}/{}/library_600x900.jpg", app.app_id));
    game.background_url = Some(format!("{STEAM_CDN}/{}/library_hero.jpg", app.app_id));
    game
}

impl StoreAdapter for SteamAdapter {
    fn id(&self) -> StoreId {
        StoreId::Steam
    }

    fn is_available(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.paths().is_ok() })
    }

    fn is_authenticated(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let Ok(paths) = self.paths() else {
                return false;
            };
            match pixxiden_steam::active_account(&paths) {
                Ok(account) => account.is_some(),
                Err(e) => {
                    debug!(error = %e, "could not read steam login users");
                    false
                }
            }
        })
    }

    fn list_games(&self) -> BoxFuture<'_, Result<Vec<StoreGame>, StoreError>> {
        Box::pin(async move {
            let paths = self.paths().map_err(steam_error)?;
            let apps = tokio::task::spawn_blocking(move || pixxiden_steam::installed_apps(&paths))
                .await
                .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
                .map_err(steam_error)?;

            let games: Vec<StoreGame> = apps.into_iter().map(normalize).collect();
            info!(count = games.len(), "steam library scanned");
            Ok(games)
        })
    }

    fn install<'a>(
        &'a self,
        app_id: &'a str,
        path: Option<&'a Path>,
        _progress: Option<mpsc::Sender<InstallProgress>>,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            if let Some(path) = path {
                debug!(app_id, path = %path.display(), "steam picks its own library, ignoring path");
            }
            let url = format!("steam://install/{app_id}");
            self.client_call(&[url.as_str()]).await
        })
    }

    fn uninstall<'a>(&'a self, app_id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let url = format!("steam://uninstall/{app_id}");
            self.client_call(&[url.as_str()]).await
        })
    }

    fn launch<'a>(&'a self, app_id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move { self.client_call(&["-applaunch", app_id]).await })
    }
}
