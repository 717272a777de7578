//! Amazon Games via `nile`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use pixxiden_model::{StoreGame, StoreId};
use pixxiden_sidecar::SidecarRunner;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::adapter::{AuthRequest, BoxFuture, InstallProgress, InteractiveAuth, StoreAdapter};
use crate::config::StoreSettings;
use crate::error::StoreError;
use crate::helper::Helper;
use crate::locate;

pub const AMAZON_REDIRECT_PREFIX: &str = "https://www.amazon.com/ap/maplanding";
pub const AMAZON_CODE_PARAM: &str = "openid.oa2.authorization_code";

const CONFIG_ENV: &str = "NILE_CONFIG_PATH";

/// Printed by `nile auth --login --non-interactive`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct LoginDescriptor {
    url: String,
    client_id: String,
    code_verifier: String,
    serial: String,
}

/// Entry of nile's own `installed.json`.
#[derive(Debug, Deserialize)]
struct InstalledEntry {
    id: String,
    path: String,
}

/// Splits `Title (ASIN: X)` or `Title - ASIN: X` into title and id.
pub(crate) fn parse_library_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    let idx = line.rfind("ASIN:")?;

    let asin = line[idx + "ASIN:".len()..]
        .trim()
        .trim_end_matches(')')
        .trim();
    let valid = !asin.is_empty()
        && asin
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if !valid {
        return None;
    }

    let head = line[..idx].trim_end();
    let title = head
        .strip_suffix('(')
        .or_else(|| head.strip_suffix('-'))
        .unwrap_or(head)
        .trim();
    if title.is_empty() {
        return None;
    }
    Some((title.to_string(), asin.to_string()))
}

/// Parses the text of `nile library list`.
///
/// Non-empty output with no recognizable line is malformed.
fn parse_library(stdout: &str) -> Result<Vec<(String, String)>, StoreError> {
    let mut out = Vec::new();
    let mut seen_text = false;
    for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
        seen_text = true;
        match parse_library_line(line) {
            Some(entry) => out.push(entry),
            None => debug!(line, "ignoring nile output line"),
        }
    }
    if seen_text && out.is_empty() {
        return Err(StoreError::malformed("no ASIN lines in nile library list"));
    }
    Ok(out)
}

pub struct NileAdapter {
    helper: Helper,
    config_dir: PathBuf,
    pending_login: Mutex<Option<LoginDescriptor>>,
}

impl NileAdapter {
    pub fn new(runner: SidecarRunner, binary: Option<PathBuf>, config_dir: PathBuf) -> Self {
        info!(binary = ?binary, config = %config_dir.display(), "nile adapter configured");
        Self {
            helper: Helper::new("nile", runner, binary).with_env(CONFIG_ENV, config_dir.clone()),
            config_dir,
            pending_login: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &StoreSettings, runner: SidecarRunner) -> Self {
        let binary = locate::find_binary("nile", settings.binary.as_deref());
        let config_dir = settings.config_path.clone().unwrap_or_else(|| {
            locate::home_dir()
                .map(|h| locate::nile_config_dir(&h))
                .unwrap_or_else(|| PathBuf::from(".config/nile"))
        });
        Self::new(runner, binary, config_dir)
    }

    fn install_paths(&self) -> HashMap<String, String> {
        let path = self.config_dir.join("installed.json");
        let Ok(text) = std::fs::read_to_string(&path) else {
            return HashMap::new();
        };
        match serde_json::from_str::<Vec<InstalledEntry>>(&text) {
            Ok(list) => list.into_iter().map(|e| (e.id, e.path)).collect(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to parse nile installed list");
                HashMap::new()
            }
        }
    }

    /// `None` when nile could not report its installs.
    async fn installed_ids(&self) -> Option<HashSet<String>> {
        let listed = match self.helper.command(["library", "list", "--installed"]) {
            Ok(cmd) => self.helper.run_ok(&cmd).await,
            Err(e) => Err(e),
        };
        match listed {
            Ok(out) => Some(
                out.stdout
                    .lines()
                    .filter_map(parse_library_line)
                    .map(|(_, asin)| asin)
                    .collect(),
            ),
            Err(e) => {
                warn!(error = %e, "could not list installed amazon games, install state left unchanged");
                None
            }
        }
    }

    fn set_pending(&self, login: Option<LoginDescriptor>) {
        match self.pending_login.lock() {
            Ok(mut guard) => *guard = login,
            Err(poisoned) => *poisoned.into_inner() = login,
        }
    }

    fn take_pending(&self) -> Option<LoginDescriptor> {
        match self.pending_login.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

impl StoreAdapter for NileAdapter {
    fn id(&self) -> StoreId {
        StoreId::Amazon
    }

    fn is_available(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.helper.is_available() })
    }

    /// nile has no status command; a working `library list` means a
    /// valid session.
    fn is_authenticated(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let Ok(cmd) = self.helper.command(["library", "list"]) else {
                return false;
            };
            match self.helper.output(&cmd).await {
                Ok(out) => out.success(),
                Err(e) => {
                    debug!(error = %e, "nile auth check failed");
                    false
                }
            }
        })
    }

    fn list_games(&self) -> BoxFuture<'_, Result<Vec<StoreGame>, StoreError>> {
        Box::pin(async move {
            // Cached metadata is still listable when the refresh fails.
            let sync = self.helper.command(["library", "sync"])?;
            match self.helper.output(&sync).await {
                Ok(out) if !out.success() => {
                    warn!(exit_code = ?out.exit_code, stderr = %out.stderr.trim(), "nile library sync failed");
                }
                Err(StoreError::Timeout(secs)) => warn!(secs, "nile library sync timed out"),
                Err(e @ StoreError::Spawn(_)) => return Err(e),
                _ => {}
            }

            let cmd = self.helper.command(["library", "list"])?;
            let out = self.helper.run_ok(&cmd).await?;
            let entries = parse_library(&out.stdout)?;

            let installed = self.installed_ids().await;
            let paths = self.install_paths();

            let games: Vec<StoreGame> = entries
                .into_iter()
                .map(|(title, asin)| {
                    let mut game = StoreGame::new(StoreId::Amazon, asin, title);
                    if let Some(installed) = &installed {
                        let is_installed = installed.contains(&game.store_id);
                        game.installed = Some(is_installed);
                        if is_installed {
                            game.install_path = paths.get(&game.store_id).cloned();
                        }
                    }
                    game
                })
                .collect();

            info!(
                count = games.len(),
                installed = ?installed.as_ref().map(HashSet::len),
                "amazon library listed"
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
            let mut cmd = self.helper.command(["install", app_id])?;
            if let Some(path) = path {
                cmd = cmd.arg("--base-path").arg(path);
            }
            self.helper.run_install(cmd, app_id, progress).await
        })
    }

    fn uninstall<'a>(&'a self, app_id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let cmd = self.helper.command(["uninstall", app_id])?;
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
            let cmd = self.helper.command(["auth", "--logout"])?;
            self.helper.run_ok(&cmd).await.map(|_| ())
        })
    }

    fn interactive_auth(&self) -> Option<&dyn InteractiveAuth> {
        Some(self)
    }
}

impl InteractiveAuth for NileAdapter {
    fn begin_auth(&self) -> BoxFuture<'_, Result<AuthRequest, StoreError>> {
        Box::pin(async move {
            let cmd = self.helper.command(["auth", "--login", "--non-interactive"])?;
            let login: LoginDescriptor = self.helper.run_json(&cmd).await?;
            let url = login.url.clone();
            self.set_pending(Some(login));
            Ok(AuthRequest {
                url,
                redirect_prefix: AMAZON_REDIRECT_PREFIX.to_string(),
                code_param: AMAZON_CODE_PARAM.to_string(),
                title: "Amazon Games Login".to_string(),
            })
        })
    }

    fn complete_auth<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let login = self
                .take_pending()
                .ok_or_else(|| StoreError::Auth("no amazon login in progress".into()))?;
            let cmd = self.helper.command([
                "register",
                "--code",
                code,
                "--code-verifier",
                login.code_verifier.as_str(),
                "--serial",
                login.serial.as_str(),
                "--client-id",
                login.client_id.as_str(),
            ])?;
            let out = self.helper.output(&cmd).await?;
            if !out.success() {
                return Err(StoreError::Auth(out.stderr.trim().to_string()));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_line_styles() {
        assert_eq!(
            parse_library_line("Quake (ASIN: B0ABC123)"),
            Some(("Quake".into(), "B0ABC123".into()))
        );
        assert_eq!(
            parse_library_line("  Tales of Monkey Island - ASIN: B0XYZ  "),
            Some(("Tales of Monkey Island".into(), "B0XYZ".into()))
        );
        assert_eq!(
            parse_library_line("Fall Guys (Season 1) (ASIN: amzn1.adg.product.1234-abcd)"),
            Some((
                "Fall Guys (Season 1)".into(),
                "amzn1.adg.product.1234-abcd".into()
            ))
        );
        assert_eq!(parse_library_line("Syncing library..."), None);
        assert_eq!(parse_library_line("(ASIN: B0)"), None);
        assert_eq!(parse_library_line("Broken (ASIN: )"), None);
    }

    #[test]
    fn noise_only_output_is_malformed() {
        assert!(parse_library("").unwrap().is_empty());
        assert!(matches!(
            parse_library("Traceback (most recent call last):\n  oops\n"),
            Err(StoreError::MalformedOutput { .. })
        ));
    }

    #[cfg(unix)]
    mod with_fake_helper {
        use super::*;
        use crate::helper::testutil::fake_helper;

        fn adapter(dir: &Path, authed: bool) -> NileAdapter {
            let list_exit = if authed { 0 } else { 1 };
            let script = format!(
                r#"echo "$@" >> "{log}"
case "$1 $2 $3" in
  "library sync "*) exit 1 ;;
  "library list --installed") [ -e "{broken}" ] && exit 1; echo "Quake (ASIN: B0ABC)" ;;
  "library list "*) [ {list_exit} -eq 0 ] || exit 1; echo "Quake (ASIN: B0ABC)"; echo "Doom - ASIN: B0DEF" ;;
  "auth --login --non-interactive") echo '{{"url": "https://www.amazon.com/ap/signin?x=1", "client_id": "cid", "code_verifier": "ver", "serial": "ser"}}' ;;
  "register "*) exit 0 ;;
  *) exit 0 ;;
esac"#,
                log = dir.join("calls").display(),
                broken = dir.join("installed-broken").display(),
            );
            let bin = fake_helper(dir, "nile", &script);
            NileAdapter::new(SidecarRunner::default(), Some(bin), dir.join("cfg"))
        }

        #[tokio::test]
        async fn lists_and_marks_installed_despite_sync_failure() {
            let dir = tempfile::tempdir().unwrap();
            std::fs::create_dir_all(dir.path().join("cfg")).unwrap();
            std::fs::write(
                dir.path().join("cfg/installed.json"),
                r#"[{"id": "B0ABC", "path": "/games/quake", "version": "1"}]"#,
            )
            .unwrap();
            let a = adapter(dir.path(), true);

            assert!(a.is_authenticated().await);
            let games = a.list_games().await.unwrap();
            assert_eq!(games.len(), 2);
            assert_eq!(games[0].id(), "amazon-B0ABC");
            assert_eq!(games[0].installed, Some(true));
            assert_eq!(games[0].install_path.as_deref(), Some("/games/quake"));
            assert_eq!(games[1].title, "Doom");
            assert_eq!(games[1].installed, Some(false));
        }

        #[tokio::test]
        async fn failed_install_list_keeps_stored_install_path() {
            use pixxiden_db::{GameStore, SqliteGameStore};

            let dir = tempfile::tempdir().unwrap();
            let a = adapter(dir.path(), true);
            let db = SqliteGameStore::in_memory().unwrap();
            let mut existing = StoreGame::new(StoreId::Amazon, "B0ABC", "Quake");
            existing.installed = Some(true);
            existing.install_path = Some("/games/quake".into());
            db.upsert(&existing).unwrap();

            std::fs::write(dir.path().join("installed-broken"), "").unwrap();
            let games = a.list_games().await.unwrap();
            assert_eq!(games.len(), 2);
            assert!(games.iter().all(|g| g.installed.is_none()));
            for game in &games {
                db.upsert(game).unwrap();
            }

            let quake = db.get_by_id("amazon-B0ABC").unwrap().unwrap();
            assert!(quake.installed);
            assert_eq!(quake.install_path.as_deref(), Some("/games/quake"));
            assert!(!db.get_by_id("amazon-B0DEF").unwrap().unwrap().installed);
        }

        #[tokio::test]
        async fn failed_list_means_unauthenticated() {
            let dir = tempfile::tempdir().unwrap();
            let a = adapter(dir.path(), false);
            assert!(!a.is_authenticated().await);
        }

        #[tokio::test]
        async fn login_descriptor_feeds_register() {
            let dir = tempfile::tempdir().unwrap();
            let a = adapter(dir.path(), true);
            let auth = a.interactive_auth().unwrap();

            assert!(matches!(
                auth.complete_auth("early").await,
                Err(StoreError::Auth(_))
            ));

            let req = auth.begin_auth().await.unwrap();
            assert_eq!(req.url, "https://www.amazon.com/ap/signin?x=1");
            assert_eq!(req.code_param, AMAZON_CODE_PARAM);

            auth.complete_auth("CODE").await.unwrap();
            let calls = std::fs::read_to_string(dir.path().join("calls")).unwrap();
            assert!(calls.contains(
                "register --code CODE --code-verifier ver --serial ser --client-id cid"
            ));
        }
    }
}
