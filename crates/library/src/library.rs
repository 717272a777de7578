use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pixxiden_auth::{AuthFlowController, AuthSession, MAX_AUTH_TIMEOUT, WebviewHost};
use pixxiden_db::{DbError, GameStore};
use pixxiden_model::{Game, StoreId, StoreStatus, SyncResult};
use pixxiden_sidecar::{SidecarCommand, SidecarRunner};
use pixxiden_stores::{StoreAdapter, StoreError, StoreRegistry};
use pixxiden_sync::{
    DEFAULT_MAX_CONCURRENT_STORES, Enricher, SyncEvent, SyncOptions, SyncOrchestrator,
};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::LibraryError;
use crate::event::LibraryEvent;

const EVENT_CAPACITY: usize = 256;

/// Entry point for everything the UI asks of the library.
pub struct Library {
    db: Arc<dyn GameStore>,
    registry: StoreRegistry,
    sync: SyncOrchestrator,
    auth: Option<AuthFlowController>,
    runner: SidecarRunner,
    events: broadcast::Sender<LibraryEvent>,
}

pub struct LibraryBuilder {
    registry: StoreRegistry,
    db: Arc<dyn GameStore>,
    max_concurrent_stores: usize,
    enricher: Option<Arc<dyn Enricher>>,
    host: Option<Arc<dyn WebviewHost>>,
    auth_timeout: Duration,
    runner: SidecarRunner,
}

impl LibraryBuilder {
    pub fn max_concurrent_stores(mut self, max: usize) -> Self {
        self.max_concurrent_stores = max;
        self
    }

    pub fn enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Enables interactive store logins.
    pub fn webview_host(mut self, host: Arc<dyn WebviewHost>) -> Self {
        self.host = Some(host);
        self
    }

    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    /// Runner used to start custom executables.
    pub fn runner(mut self, runner: SidecarRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Builds the library. Sync progress is only forwarded to subscribers
    /// when called inside a Tokio runtime.
    pub fn build(self) -> Library {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let mut sync = SyncOrchestrator::new(self.registry.adapters().to_vec(), Arc::clone(&self.db))
            .with_max_concurrent(self.max_concurrent_stores);
        if let Some(enricher) = self.enricher {
            sync = sync.with_enricher(enricher);
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
                handle.spawn(forward_sync_events(rx, events.clone()));
                sync = sync.with_events(tx);
            }
            Err(_) => warn!("no async runtime, sync progress events disabled"),
        }

        let auth = self
            .host
            .map(|host| AuthFlowController::new(host).with_timeout(self.auth_timeout));

        Library {
            db: self.db,
            registry: self.registry,
            sync,
            auth,
            runner: self.runner,
            events,
        }
    }
}

async fn forward_sync_events(
    mut rx: mpsc::Receiver<SyncEvent>,
    events: broadcast::Sender<LibraryEvent>,
) {
    while let Some(event) = rx.recv().await {
        let _ = events.send(LibraryEvent::Sync(event));
    }
}

impl Library {
    pub fn builder(registry: StoreRegistry, db: Arc<dyn GameStore>) -> LibraryBuilder {
        LibraryBuilder {
            registry,
            db,
            max_concurrent_stores: DEFAULT_MAX_CONCURRENT_STORES,
            enricher: None,
            host: None,
            auth_timeout: MAX_AUTH_TIMEOUT,
            runner: SidecarRunner::default(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LibraryEvent> {
        self.events.subscribe()
    }

    pub async fn get_games(&self) -> Result<Vec<Game>, LibraryError> {
        let db = Arc::clone(&self.db);
        Ok(blocking(move || db.get_all()).await?)
    }

    pub async fn get_game(&self, id: &str) -> Result<Option<Game>, LibraryError> {
        let db = Arc::clone(&self.db);
        let id = id.to_string();
        Ok(blocking(move || db.get_by_id(&id)).await?)
    }

    /// Title or developer substring search.
    pub async fn search_games(&self, query: &str) -> Result<Vec<Game>, LibraryError> {
        let db = Arc::clone(&self.db);
        let query = query.to_string();
        Ok(blocking(move || db.search(&query)).await?)
    }

    pub async fn get_recently_played(&self, limit: usize) -> Result<Vec<Game>, LibraryError> {
        let db = Arc::clone(&self.db);
        Ok(blocking(move || db.recently_played(limit)).await?)
    }

    pub async fn get_favorites(&self) -> Result<Vec<Game>, LibraryError> {
        let db = Arc::clone(&self.db);
        Ok(blocking(move || db.favorites()).await?)
    }

    /// Flips the favorite flag; returns the new value.
    pub async fn toggle_favorite(&self, id: &str) -> Result<bool, LibraryError> {
        let db = Arc::clone(&self.db);
        let game_id = id.to_string();
        blocking(move || db.toggle_favorite(&game_id))
            .await
            .map_err(not_found_as_game)
    }

    pub async fn sync_games(&self) -> Result<SyncResult, LibraryError> {
        Ok(self.sync.sync().await?)
    }

    pub async fn sync_games_with_cancel(
        &self,
        token: CancellationToken,
    ) -> Result<SyncResult, LibraryError> {
        Ok(self.sync.sync_with_cancel(token).await?)
    }

    /// Sync restricted to some stores, or with enrichment tuned.
    pub async fn sync_games_with_options(
        &self,
        options: &SyncOptions,
        token: CancellationToken,
    ) -> Result<SyncResult, LibraryError> {
        Ok(self.sync.sync_with_options(options, token).await?)
    }

    pub fn is_syncing(&self) -> bool {
        self.sync.is_running()
    }

    pub async fn get_store_status(&self) -> Vec<StoreStatus> {
        self.registry.status().await
    }

    /// Starts a game: the custom executable when one is set, otherwise
    /// through the store.
    pub async fn launch_game(&self, id: &str) -> Result<(), LibraryError> {
        let game = self.require_game(id).await?;
        let adapter = self.adapter(game.store)?;
        info!(id, title = %game.title, store = %game.store, "launching game");

        let launched = match game.custom_executable.as_deref() {
            Some(exe) => {
                self.launch_custom(game.store, exe, game.install_path.as_deref())
                    .await
            }
            None => adapter
                .launch(&game.store_id)
                .await
                .map(|()| None)
                .map_err(|source| LibraryError::Store {
                    store: game.store,
                    source,
                }),
        };

        match launched {
            Ok(pid) => {
                let db = Arc::clone(&self.db);
                let game_id = game.id.clone();
                if let Err(e) = blocking(move || db.record_launch(&game_id, Utc::now())).await {
                    warn!(id, error = %e, "could not record launch");
                }
                self.emit(LibraryEvent::Launched {
                    game_id: game.id,
                    pid,
                });
                Ok(())
            }
            Err(e) => {
                warn!(id, error = %e, "launch failed");
                self.emit(LibraryEvent::LaunchFailed {
                    game_id: game.id,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn launch_custom(
        &self,
        store: StoreId,
        exe: &str,
        install_path: Option<&str>,
    ) -> Result<Option<u32>, LibraryError> {
        let mut cmd = SidecarCommand::new(exe);
        if let Some(dir) = install_path.map(Path::new).filter(|p| p.is_dir()) {
            cmd = cmd.current_dir(dir);
        }
        self.runner
            .spawn_detached(&cmd)
            .await
            .map_err(|e| LibraryError::Store {
                store,
                source: StoreError::from(e),
            })
    }

    /// Installs through the store, forwarding progress to subscribers.
    pub async fn install_game(&self, id: &str, path: Option<PathBuf>) -> Result<(), LibraryError> {
        let game = self.require_game(id).await?;
        let adapter = self.adapter(game.store)?;
        info!(id, store = %game.store, path = ?path, "installing game");

        let (tx, mut rx) = mpsc::channel(64);
        let events = self.events.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(progress) = rx.recv().await {
                let _ = events.send(LibraryEvent::InstallProgress(progress));
            }
        });

        let installed = adapter
            .install(&game.store_id, path.as_deref(), Some(tx))
            .await;
        if let Err(e) = forwarder.await {
            warn!(id, error = %e, "progress forwarding stopped");
        }

        match installed {
            Ok(()) => {
                let db = Arc::clone(&self.db);
                let game_id = game.id.clone();
                let path = path.map(|p| p.display().to_string());
                blocking(move || db.set_installed(&game_id, true, path.as_deref())).await?;
                info!(id, "game installed");
                self.emit(LibraryEvent::Installed { game_id: game.id });
                Ok(())
            }
            Err(source) => {
                warn!(id, error = %source, "install failed");
                self.emit(LibraryEvent::InstallFailed {
                    game_id: game.id,
                    error: source.to_string(),
                });
                Err(LibraryError::Store {
                    store: game.store,
                    source,
                })
            }
        }
    }

    pub async fn uninstall_game(&self, id: &str) -> Result<(), LibraryError> {
        let game = self.require_game(id).await?;
        let adapter = self.adapter(game.store)?;
        info!(id, store = %game.store, "uninstalling game");

        adapter
            .uninstall(&game.store_id)
            .await
            .map_err(|source| LibraryError::Store {
                store: game.store,
                source,
            })?;

        let db = Arc::clone(&self.db);
        let game_id = game.id.clone();
        blocking(move || db.set_installed(&game_id, false, None)).await?;
        self.emit(LibraryEvent::Uninstalled { game_id: game.id });
        Ok(())
    }

    /// Runs an interactive login for `store`.
    pub async fn authenticate_store(&self, store: StoreId) -> Result<AuthSession, LibraryError> {
        let auth = self.auth.as_ref().ok_or(LibraryError::NoWebviewHost)?;
        let adapter = self.adapter(store)?;
        let session = auth.authenticate(adapter.as_ref()).await?;
        session.result(auth.timeout().as_secs())?;
        Ok(session)
    }

    pub fn cancel_authentication(&self, store: StoreId) -> bool {
        self.auth.as_ref().is_some_and(|auth| auth.cancel(store))
    }

    /// Sets or clears the user's executable override.
    pub async fn set_custom_executable(
        &self,
        id: &str,
        path: Option<String>,
    ) -> Result<(), LibraryError> {
        let db = Arc::clone(&self.db);
        let game_id = id.to_string();
        blocking(move || db.set_custom_executable(&game_id, path.as_deref()))
            .await
            .map_err(not_found_as_game)
    }

    async fn require_game(&self, id: &str) -> Result<Game, LibraryError> {
        self.get_game(id)
            .await?
            .ok_or_else(|| LibraryError::GameNotFound(id.to_string()))
    }

    fn adapter(&self, store: StoreId) -> Result<&Arc<dyn StoreAdapter>, LibraryError> {
        self.registry
            .get(store)
            .ok_or(LibraryError::StoreDisabled(store))
    }

    fn emit(&self, event: LibraryEvent) {
        let _ = self.events.send(event);
    }
}

fn not_found_as_game(e: DbError) -> LibraryError {
    match e {
        DbError::NotFound(id) => LibraryError::GameNotFound(id),
        other => other.into(),
    }
}

async fn blocking<T, F>(f: F) -> Result<T, DbError>
where
    F: FnOnce() -> Result<T, DbError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DbError::Io(std::io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pixxiden_auth::{AuthError, SurfaceEvent, SurfaceRequest};
    use pixxiden_db::SqliteGameStore;
    use pixxiden_model::StoreGame;
    use pixxiden_stores::{AuthRequest, BoxFuture, InstallProgress, InteractiveAuth};

    use super::*;

    #[derive(Default)]
    struct MockEpic {
        calls: Mutex<Vec<String>>,
        fail_install: bool,
    }

    impl StoreAdapter for MockEpic {
        fn id(&self) -> StoreId {
            StoreId::Epic
        }

        fn is_available(&self) -> BoxFuture<'_, bool> {
            Box::pin(async { true })
        }

        fn is_authenticated(&self) -> BoxFuture<'_, bool> {
            Box::pin(async { true })
        }

        fn list_games(&self) -> BoxFuture<'_, Result<Vec<StoreGame>, StoreError>> {
            Box::pin(async { Ok(vec![StoreGame::new(StoreId::Epic, "fn", "Fortnite")]) })
        }

        fn install<'a>(
            &'a self,
            app_id: &'a str,
            _path: Option<&'a Path>,
            progress: Option<mpsc::Sender<InstallProgress>>,
        ) -> BoxFuture<'a, Result<(), StoreError>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(format!("install {app_id}"));
                if self.fail_install {
                    return Err(StoreError::Unsupported("disk full".into()));
                }
                if let Some(tx) = progress {
                    for percent in [50.0, 100.0] {
                        let _ = tx
                            .send(InstallProgress {
                                app_id: app_id.to_string(),
                                percent,
                                downloaded: None,
                                total: None,
                                eta: None,
                            })
                            .await;
                    }
                }
                Ok(())
            })
        }

        fn uninstall<'a>(&'a self, app_id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(format!("uninstall {app_id}"));
                Ok(())
            })
        }

        fn launch<'a>(&'a self, app_id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(format!("launch {app_id}"));
                Ok(())
            })
        }

        fn interactive_auth(&self) -> Option<&dyn InteractiveAuth> {
            Some(self)
        }
    }

    impl InteractiveAuth for MockEpic {
        fn begin_auth(&self) -> BoxFuture<'_, Result<AuthRequest, StoreError>> {
            Box::pin(async {
                Ok(AuthRequest {
                    url: "https://www.epicgames.com/id/login".into(),
                    redirect_prefix: "http://localhost/launcher/authorized".into(),
                    code_param: "code".into(),
                    title: "Epic Games login".into(),
                })
            })
        }

        fn complete_auth<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
            Box::pin(async move {
                self.calls.lock().unwrap().push(format!("auth {code}"));
                Ok(())
            })
        }
    }

    /// Immediately closes every surface it opens.
    struct ClosingHost;

    impl WebviewHost for ClosingHost {
        fn open<'a>(
            &'a self,
            _request: &'a SurfaceRequest,
        ) -> BoxFuture<'a, Result<mpsc::Receiver<SurfaceEvent>, String>> {
            Box::pin(async {
                let (tx, rx) = mpsc::channel(1);
                let _ = tx.try_send(SurfaceEvent::CloseRequested);
                Ok(rx)
            })
        }

        fn close(&self, _label: &str) {}
    }

    async fn library_with(epic: Arc<MockEpic>) -> (Library, Arc<SqliteGameStore>) {
        let db = Arc::new(SqliteGameStore::in_memory().unwrap());
        let epic: Arc<dyn StoreAdapter> = epic;
        let library = Library::builder(StoreRegistry::new(vec![epic]), db.clone()).build();
        library.sync_games().await.unwrap();
        (library, db)
    }

    /// Pending non-sync events.
    fn drain(rx: &mut broadcast::Receiver<LibraryEvent>) -> Vec<LibraryEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if !matches!(event, LibraryEvent::Sync(_)) {
                out.push(event);
            }
        }
        out
    }

    #[tokio::test]
    async fn sync_then_query() {
        let (library, _db) = library_with(Arc::new(MockEpic::default())).await;
        let games = library.get_games().await.unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].id, "epic-fn");
        assert!(library.get_game("epic-fn").await.unwrap().is_some());
        assert!(library.get_game("epic-nope").await.unwrap().is_none());
        assert!(!library.is_syncing());
    }

    #[tokio::test]
    async fn sync_progress_reaches_subscribers() {
        let db = Arc::new(SqliteGameStore::in_memory().unwrap());
        let epic: Arc<dyn StoreAdapter> = Arc::new(MockEpic::default());
        let library = Library::builder(StoreRegistry::new(vec![epic]), db).build();
        let mut rx = library.subscribe();

        library.sync_games().await.unwrap();
        let finished = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(LibraryEvent::Sync(SyncEvent::Finished { total_synced, .. })) =
                    rx.recv().await
                {
                    return total_synced;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(finished, 1);
    }

    #[tokio::test]
    async fn install_reports_progress_and_marks_installed() {
        let epic = Arc::new(MockEpic::default());
        let (library, db) = library_with(epic.clone()).await;
        let mut rx = library.subscribe();

        library
            .install_game("epic-fn", Some(PathBuf::from("/games/fortnite")))
            .await
            .unwrap();

        let game = db.get_by_id("epic-fn").unwrap().unwrap();
        assert!(game.installed);
        assert_eq!(game.install_path.as_deref(), Some("/games/fortnite"));

        let events = drain(&mut rx);
        let percents: Vec<f32> = events
            .iter()
            .filter_map(|e| match e {
                LibraryEvent::InstallProgress(p) => Some(p.percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents, vec![50.0, 100.0]);
        assert_eq!(
            events.last(),
            Some(&LibraryEvent::Installed {
                game_id: "epic-fn".into()
            })
        );
    }

    #[tokio::test]
    async fn failed_install_is_reported() {
        let epic = Arc::new(MockEpic {
            fail_install: true,
            ..Default::default()
        });
        let (library, db) = library_with(epic).await;
        let mut rx = library.subscribe();

        let err = library.install_game("epic-fn", None).await.unwrap_err();
        assert!(matches!(err, LibraryError::Store { store: StoreId::Epic, .. }));
        assert!(!db.get_by_id("epic-fn").unwrap().unwrap().installed);
        assert!(matches!(
            drain(&mut rx).last(),
            Some(LibraryEvent::InstallFailed { .. })
        ));
    }

    #[tokio::test]
    async fn launch_and_uninstall_delegate_to_store() {
        let epic = Arc::new(MockEpic::default());
        let (library, db) = library_with(epic.clone()).await;
        db.set_installed("epic-fn", true, Some("/games/fortnite")).unwrap();
        let mut rx = library.subscribe();

        library.launch_game("epic-fn").await.unwrap();
        assert!(db.get_by_id("epic-fn").unwrap().unwrap().last_played.is_some());

        library.uninstall_game("epic-fn").await.unwrap();
        let game = db.get_by_id("epic-fn").unwrap().unwrap();
        assert!(!game.installed);
        assert_eq!(game.install_path, None);

        assert_eq!(
            *epic.calls.lock().unwrap(),
            vec!["launch fn".to_string(), "uninstall fn".to_string()]
        );
        assert_eq!(
            drain(&mut rx),
            vec![
                LibraryEvent::Launched {
                    game_id: "epic-fn".into(),
                    pid: None
                },
                LibraryEvent::Uninstalled {
                    game_id: "epic-fn".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn unknown_game_and_disabled_store() {
        let (library, db) = library_with(Arc::new(MockEpic::default())).await;
        assert!(matches!(
            library.launch_game("epic-missing").await,
            Err(LibraryError::GameNotFound(id)) if id == "epic-missing"
        ));

        db.upsert(&StoreGame::new(StoreId::Gog, "g1", "DREDGE")).unwrap();
        assert!(matches!(
            library.install_game("gog-g1", None).await,
            Err(LibraryError::StoreDisabled(StoreId::Gog))
        ));
        assert!(matches!(
            library.set_custom_executable("gog-missing", Some("/bin/true".into())).await,
            Err(LibraryError::GameNotFound(_))
        ));
    }

    #[tokio::test]
    async fn custom_executable_round_trip() {
        let (library, _db) = library_with(Arc::new(MockEpic::default())).await;
        library
            .set_custom_executable("epic-fn", Some("/opt/fn/run.sh".into()))
            .await
            .unwrap();
        let game = library.get_game("epic-fn").await.unwrap().unwrap();
        assert_eq!(game.launch_executable(), Some("/opt/fn/run.sh"));

        let json = serde_json::to_value(&game).unwrap();
        assert_eq!(json["customExecutable"], "/opt/fn/run.sh");
    }

    #[tokio::test]
    async fn search_recent_and_favorites() {
        let epic = Arc::new(MockEpic::default());
        let (library, db) = library_with(epic).await;
        db.upsert(&StoreGame::new(StoreId::Epic, "hd", "Hades")).unwrap();

        let found = library.search_games("fort").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "epic-fn");

        assert!(library.get_recently_played(5).await.unwrap().is_empty());
        library.launch_game("epic-fn").await.unwrap();
        let recent = library.get_recently_played(5).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "epic-fn");

        assert!(library.toggle_favorite("epic-hd").await.unwrap());
        let favorites = library.get_favorites().await.unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].id, "epic-hd");
        assert!(matches!(
            library.toggle_favorite("epic-missing").await,
            Err(LibraryError::GameNotFound(id)) if id == "epic-missing"
        ));
    }

    #[tokio::test]
    async fn sync_options_filter_stores() {
        let db = Arc::new(SqliteGameStore::in_memory().unwrap());
        let epic: Arc<dyn StoreAdapter> = Arc::new(MockEpic::default());
        let library = Library::builder(StoreRegistry::new(vec![epic]), db.clone()).build();

        let result = library
            .sync_games_with_options(&SyncOptions::only([StoreId::Gog]), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.total_synced, 0);
        assert!(result.stores.is_empty());
        assert_eq!(db.count().unwrap(), 0);

        let result = library
            .sync_games_with_options(&SyncOptions::only([StoreId::Epic]), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.total_synced, 1);
    }

    #[tokio::test]
    async fn authentication_needs_a_host() {
        let (library, _db) = library_with(Arc::new(MockEpic::default())).await;
        assert!(matches!(
            library.authenticate_store(StoreId::Epic).await,
            Err(LibraryError::NoWebviewHost)
        ));
        assert!(!library.cancel_authentication(StoreId::Epic));

        let db = Arc::new(SqliteGameStore::in_memory().unwrap());
        let epic: Arc<dyn StoreAdapter> = Arc::new(MockEpic::default());
        let library = Library::builder(StoreRegistry::new(vec![epic]), db)
            .webview_host(Arc::new(ClosingHost))
            .build();
        assert!(matches!(
            library.authenticate_store(StoreId::Epic).await,
            Err(LibraryError::Auth(AuthError::Cancelled))
        ));
        assert!(matches!(
            library.authenticate_store(StoreId::Steam).await,
            Err(LibraryError::StoreDisabled(StoreId::Steam))
        ));
    }
}
