//! Epic Games Store via `legendary`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use pixxiden_model::{StoreGame, StoreId};
use pixxiden_sidecar::SidecarRunner;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::adapter::{AuthRequest, BoxFuture, InstallProgress, InteractiveAuth, StoreAdapter};
use crate::config::StoreSettings;
use crate::error::StoreError;
use crate::helper::{Helper, parse_json};
use crate::locate;

pub const EPIC_AUTH_URL: &str = "https://www.epicgames.com/id/api/redirect?clientId=34a02cf8f4414e29b15921876da36f9a&responseType=code";
pub const EPIC_REDIRECT_PREFIX: &str = "http://localhost/launcher/authorized";

const CONFIG_ENV: &str = "LEGENDARY_CONFIG_PATH";

#[derive(Debug, Deserialize)]
struct Status {
    account: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwnedGame {
    app_name: String,
    #[serde(alias = "title")]
    app_title: String,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metadata {
    description: Option<String>,
    developer: Option<String>,
    #[serde(default)]
    key_images: Vec<KeyImage>,
    #[serde(default)]
    release_info: Vec<ReleaseInfo>,
}

#[derive(Debug, Deserialize)]
struct KeyImage {
    #[serde(rename = "type")]
    kind: String,
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReleaseInfo {
    date_added: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstalledGame {
    app_name: String,
    install_path: String,
    #[serde(default)]
    executable: Option<String>,
}

/// Epic adapter. Every call carries `LEGENDARY_CONFIG_PATH`.
pub struct LegendaryAdapter {
    helper: Helper,
}

impl LegendaryAdapter {
    pub fn new(runner: SidecarRunner, binary: Option<PathBuf>, config_dir: PathBuf) -> Self {
        info!(binary = ?binary, config = %config_dir.display(), "legendary adapter configured");
        Self {
            helper: Helper::new("legendary", runner, binary).with_env(CONFIG_ENV, config_dir),
        }
    }

    /// Resolves binary and config dir from settings, falling back to
    /// Heroic's locations.
    pub fn from_settings(settings: &StoreSettings, runner: SidecarRunner) -> Self {
        let binary = locate::find_binary("legendary", settings.binary.as_deref());
        let config_dir = settings.config_path.clone().unwrap_or_else(|| {
            locate::home_dir()
                .map(|h| locate::legendary_config_dir(&h))
                .unwrap_or_else(|| PathBuf::from(".config/legendary"))
        });
        Self::new(runner, binary, config_dir)
    }

    /// `None` when `list-installed` could not be read; install state is
    /// then unknown rather than empty.
    async fn installed(&self) -> Option<HashMap<String, InstalledGame>> {
        let listed = match self.helper.command(["list-installed", "--json"]) {
            Ok(cmd) => self.helper.run_json::<Vec<InstalledGame>>(&cmd).await,
            Err(e) => Err(e),
        };
        match listed {
            Ok(list) => Some(list.into_iter().map(|g| (g.app_name.clone(), g)).collect()),
            Err(e) => {
                warn!(error = %e, "could not read installed epic games, install state left unchanged");
                None
            }
        }
    }
}

fn is_real_account(account: Option<&str>) -> bool {
    account.is_some_and(|a| !a.is_empty() && !a.starts_with('<'))
}

fn pick_image(images: &[KeyImage], kinds: &[&str]) -> Option<String> {
    kinds.iter().find_map(|kind| {
        images
            .iter()
            .find(|img| img.kind == *kind)
            .map(|img| img.url.clone())
    })
}

/// `installed` is `None` when the install list is unknown, `Some(None)`
/// when the game is known not to be installed.
fn normalize(game: OwnedGame, installed: Option<Option<&InstalledGame>>) -> StoreGame {
    let mut out = StoreGame::new(StoreId::Epic, game.app_name, game.app_title);
    out.installed = installed.map(|inst| inst.is_some());

    if let Some(inst) = installed.flatten() {
        out.install_path = Some(inst.install_path.clone());
        out.executable_path = inst
            .executable
            .as_deref()
            .filter(|e| !e.is_empty())
            .map(|e| Path::new(&inst.install_path).join(e).display().to_string());
    }

    if let Some(meta) = game.metadata {
        out.developer = meta.developer.filter(|d| !d.is_empty());
        out.description = meta.description.filter(|d| !d.is_empty());
        out.release_date = meta.release_info.into_iter().find_map(|r| r.date_added);
        out.cover_url = pick_image(&meta.key_images, &["DieselGameBoxTall", "Thumbnail"]);
        out.background_url = pick_image(&meta.key_images, &["DieselGameBox", "DieselGameBoxWide"]);
    }
    out
}

/// Parses `legendary list --json` and merges `list-installed` details.
fn parse_library(
    stdout: &str,
    installed: Option<&HashMap<String, InstalledGame>>,
) -> Result<Vec<StoreGame>, StoreError> {
    let owned: Vec<OwnedGame> = parse_json("legendary", stdout)?;
    Ok(owned
        .into_iter()
        .map(|g| {
            let inst = installed.map(|map| map.get(&g.app_name));
            normalize(g, inst)
        })
        .collect())
}

impl StoreAdapter for LegendaryAdapter {
    fn id(&self) -> StoreId {
        StoreId::Epic
    }

    fn is_available(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.helper.is_available() })
    }

    fn is_authenticated(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let Ok(cmd) = self.helper.command(["status", "--json"]) else {
                return false;
            };
            match self.helper.run_json::<Status>(&cmd).await {
                Ok(status) => is_real_account(status.account.as_deref()),
                Err(e) => {
                    debug!(error = %e, "legendary status failed");
                    false
                }
            }
        })
    }

    fn list_games(&self) -> BoxFuture<'_, Result<Vec<StoreGame>, StoreError>> {
        Box::pin(async move {
            let cmd = self.helper.command(["list", "--json"])?;
            let out = self.helper.run_ok(&cmd).await?;
            let installed = self.installed().await;
            let games = parse_library(&out.stdout, installed.as_ref())?;
            info!(
                count = games.len(),
                installed = ?installed.as_ref().map(HashMap::len),
                "legendary library listed"
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
            let mut cmd = self.helper.command(["install", app_id, "-y"])?;
            if let Some(path) = path {
                cmd = cmd.arg("--base-path").arg(path);
            }
            self.helper.run_install(cmd, app_id, progress).await
        })
    }

    fn uninstall<'a>(&'a self, app_id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let cmd = self.helper.command(["uninstall", app_id, "-y"])?;
            self.helper.run_ok(&cmd).await.map(|_| ())
        })
    }

    fn launch<'a>(&'a self, app_id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let cmd = self.helper.command(["launch", app_id])?;
            self.helper.launch_detached(&cmd).await
        })
    }

    fn logout(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let cmd = self.helper.command(["auth", "--delete"])?;
            self.helper.run_ok(&cmd).await.map(|_| ())
        })
    }

    fn interactive_auth(&self) -> Option<&dyn InteractiveAuth> {
        Some(self)
    }
}

impl InteractiveAuth for LegendaryAdapter {
    fn begin_auth(&self) -> BoxFuture<'_, Result<AuthRequest, StoreError>> {
        Box::pin(async {
            Ok(AuthRequest {
                url: EPIC_AUTH_URL.to_string(),
                redirect_prefix: EPIC_REDIRECT_PREFIX.to_string(),
                code_param: "code".to_string(),
                title: "Epic Games Login".to_string(),
            })
        })
    }

    fn complete_auth<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let cmd = self.helper.command(["auth", "--code", code])?;
            self.helper
                .run_ok(&cmd)
                .await
                .map(|_| ())
                .map_err(|e| match e {
                    StoreError::HelperFailed { stderr, .. } => StoreError::Auth(stderr),
                    other => other,
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST_JSON: &str = r#"[
      {
        "app_name": "Fortnite",
        "app_title": "Fortnite",
        "metadata": {
          "developer": "Epic Games",
          "description": "Battle royale",
          "keyImages": [
            {"type": "DieselGameBoxTall", "url": "https://cdn/tall.jpg"},
            {"type": "DieselGameBox", "url": "https://cdn/wide.jpg"}
          ],
          "releaseInfo": [{"dateAdded": "2017-07-25T00:00:00.000Z"}]
        }
      },
      {"app_name": "Sugar", "app_title": "Celeste"}
    ]"#;

    const INSTALLED_JSON: &str =
        r#"[{"app_name": "Sugar", "install_path": "/games/Celeste", "executable": "Celeste.exe", "install_size": 1024}]"#;

    #[test]
    fn parses_and_merges_library() {
        let installed: Vec<InstalledGame> = serde_json::from_str(INSTALLED_JSON).unwrap();
        let installed = installed
            .into_iter()
            .map(|g| (g.app_name.clone(), g))
            .collect();
        let games = parse_library(LIST_JSON, Some(&installed)).unwrap();

        assert_eq!(games.len(), 2);
        let fortnite = &games[0];
        assert_eq!(fortnite.id(), "epic-Fortnite");
        assert_eq!(fortnite.installed, Some(false));
        assert_eq!(fortnite.developer.as_deref(), Some("Epic Games"));
        assert_eq!(fortnite.cover_url.as_deref(), Some("https://cdn/tall.jpg"));
        assert_eq!(fortnite.background_url.as_deref(), Some("https://cdn/wide.jpg"));
        assert_eq!(fortnite.release_date.as_deref(), Some("2017-07-25T00:00:00.000Z"));

        let celeste = &games[1];
        assert_eq!(celeste.title, "Celeste");
        assert_eq!(celeste.installed, Some(true));
        assert_eq!(celeste.install_path.as_deref(), Some("/games/Celeste"));
        assert_eq!(celeste.executable_path.as_deref(), Some("/games/Celeste/Celeste.exe"));
        assert_eq!(celeste.cover_url, None);
    }

    #[test]
    fn garbage_is_malformed() {
        let err = parse_library("not json", Some(&HashMap::new())).unwrap_err();
        assert!(matches!(err, StoreError::MalformedOutput { .. }));
    }

    #[test]
    fn unknown_install_list_leaves_state_unset() {
        let games = parse_library(LIST_JSON, None).unwrap();
        assert!(games.iter().all(|g| g.installed.is_none()));
        assert!(games.iter().all(|g| g.install_path.is_none()));
        assert!(games.iter().all(|g| g.executable_path.is_none()));
    }

    #[test]
    fn account_detection() {
        assert!(is_real_account(Some("deck_user")));
        assert!(!is_real_account(Some("<not logged in>")));
        assert!(!is_real_account(Some("")));
        assert!(!is_real_account(None));
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let adapter = LegendaryAdapter::new(SidecarRunner::default(), None, PathBuf::from("/tmp"));
        assert!(!adapter.is_available().await);
        assert!(!adapter.is_authenticated().await);
        assert!(matches!(adapter.list_games().await, Err(StoreError::Spawn(_))));
    }

    #[cfg(unix)]
    mod with_fake_helper {
        use super::*;
        use crate::helper::testutil::fake_helper;

        fn adapter(dir: &Path) -> LegendaryAdapter {
            let script = format!(
                r#"echo "$@" >> "{log}"
echo "$LEGENDARY_CONFIG_PATH" > "{env}"
case "$1" in
  status) echo '{{"account": "deck", "games_available": 2}}' ;;
  list) echo '[{{"app_name": "Sugar", "app_title": "Celeste"}}]' ;;
  list-installed) [ -e "{broken}" ] && {{ echo "config locked" >&2; exit 1; }}; echo '[]' ;;
  install)
    echo "[cli] INFO: = Progress: 50.00% (1.00/2.00 GiB), Running for 00:00:01, ETA: 00:00:01" >&2
    echo "[cli] INFO: = Progress: 100.00% (2.00/2.00 GiB), Running for 00:00:02, ETA: 00:00:00" >&2 ;;
  auth) [ "$2" = "--code" ] && [ "$3" = "good" ] && exit 0; echo "invalid code" >&2; exit 1 ;;
  *) exit 0 ;;
esac"#,
                log = dir.join("calls").display(),
                env = dir.join("env").display(),
                broken = dir.join("installed-broken").display(),
            );
            let bin = fake_helper(dir, "legendary", &script);
            LegendaryAdapter::new(SidecarRunner::default(), Some(bin), dir.join("cfg"))
        }

        #[tokio::test]
        async fn lists_with_config_env() {
            let dir = tempfile::tempdir().unwrap();
            let a = adapter(dir.path());

            assert!(a.is_available().await);
            assert!(a.is_authenticated().await);
            let games = a.list_games().await.unwrap();
            assert_eq!(games.len(), 1);
            assert_eq!(games[0].store_id, "Sugar");
            assert_eq!(games[0].installed, Some(false));

            let env = std::fs::read_to_string(dir.path().join("env")).unwrap();
            assert_eq!(env.trim(), dir.path().join("cfg").display().to_string());
        }

        #[tokio::test]
        async fn failed_install_list_keeps_stored_install_path() {
            use pixxiden_db::{GameStore, SqliteGameStore};

            let dir = tempfile::tempdir().unwrap();
            let a = adapter(dir.path());
            let db = SqliteGameStore::in_memory().unwrap();
            let mut existing = StoreGame::new(StoreId::Epic, "Sugar", "Celeste");
            existing.installed = Some(true);
            existing.install_path = Some("/games/Celeste".into());
            db.upsert(&existing).unwrap();

            std::fs::write(dir.path().join("installed-broken"), "").unwrap();
            let games = a.list_games().await.unwrap();
            assert_eq!(games[0].installed, None);
            for game in &games {
                db.upsert(game).unwrap();
            }

            let stored = db.get_by_id("epic-Sugar").unwrap().unwrap();
            assert!(stored.installed);
            assert_eq!(stored.install_path.as_deref(), Some("/games/Celeste"));
        }

        #[tokio::test]
        async fn install_reports_progress() {
            let dir = tempfile::tempdir().unwrap();
            let a = adapter(dir.path());
            let (tx, mut rx) = mpsc::channel(8);

            a.install("Sugar", Some(Path::new("/games")), Some(tx))
                .await
                .unwrap();

            let mut percents = Vec::new();
            while let Some(p) = rx.recv().await {
                percents.push(p.percent);
            }
            assert_eq!(percents, vec![50.0, 100.0]);

            let calls = std::fs::read_to_string(dir.path().join("calls")).unwrap();
            assert!(calls.contains("install Sugar -y --base-path /games"));
        }

        #[tokio::test]
        async fn auth_completion() {
            let dir = tempfile::tempdir().unwrap();
            let a = adapter(dir.path());
            let auth = a.interactive_auth().unwrap();

            let req = auth.begin_auth().await.unwrap();
            assert_eq!(req.redirect_prefix, EPIC_REDIRECT_PREFIX);
            assert_eq!(req.code_param, "code");

            auth.complete_auth("good").await.unwrap();
            let err = auth.complete_auth("bad").await.unwrap_err();
            assert_eq!(err.to_string(), "authentication failed: invalid code");
        }
    }
}
