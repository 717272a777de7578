use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use pixxiden_db::{DbError, GameStore};
use pixxiden_model::{
    Game, GameKey, StoreGame, StoreId, StoreOutcome, StoreSyncReport, SyncResult,
};
use pixxiden_stores::{StoreAdapter, StoreError};
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::enrich::Enricher;
use crate::error::SyncError;
use crate::event::SyncEvent;
use crate::options::SyncOptions;

/// Default cap on stores listed at once (and so on live helper processes).
pub const DEFAULT_MAX_CONCURRENT_STORES: usize = 4;

/// Runs sync passes over a fixed set of adapters.
pub struct SyncOrchestrator {
    adapters: Vec<Arc<dyn StoreAdapter>>,
    store: Arc<dyn GameStore>,
    enricher: Option<Arc<dyn Enricher>>,
    events: Option<mpsc::Sender<SyncEvent>>,
    max_concurrent: usize,
    running: Mutex<()>,
}

/// What one adapter's task produced.
struct StoreRun {
    store: StoreId,
    name: String,
    outcome: StoreOutcome,
    games: Vec<StoreGame>,
    error: Option<String>,
    notice: Option<String>,
}

impl StoreRun {
    fn new(adapter: &dyn StoreAdapter, outcome: StoreOutcome) -> Self {
        Self {
            store: adapter.id(),
            name: adapter.store_name().to_string(),
            outcome,
            games: Vec::new(),
            error: None,
            notice: None,
        }
    }
}

impl SyncOrchestrator {
    pub fn new(adapters: Vec<Arc<dyn StoreAdapter>>, store: Arc<dyn GameStore>) -> Self {
        Self {
            adapters,
            store,
            enricher: None,
            events: None,
            max_concurrent: DEFAULT_MAX_CONCURRENT_STORES,
            running: Mutex::new(()),
        }
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn Enricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    /// Progress events are sent best-effort; a full channel drops them.
    pub fn with_events(mut self, events: mpsc::Sender<SyncEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn adapters(&self) -> &[Arc<dyn StoreAdapter>] {
        &self.adapters
    }

    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    pub async fn sync(&self) -> Result<SyncResult, SyncError> {
        self.sync_with_cancel(CancellationToken::new()).await
    }

    /// Runs one pass. Cancelling `token` abandons stores not yet finished;
    /// whatever was listed before that is still persisted.
    pub async fn sync_with_cancel(&self, token: CancellationToken) -> Result<SyncResult, SyncError> {
        self.sync_with_options(&SyncOptions::default(), token).await
    }

    /// Runs one pass restricted and tuned by `options`.
    pub async fn sync_with_options(
        &self,
        options: &SyncOptions,
        token: CancellationToken,
    ) -> Result<SyncResult, SyncError> {
        let _pass = self
            .running
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning)?;
        let started = Instant::now();

        let store = Arc::clone(&self.store);
        blocking(move || store.ping()).await?;

        let selected: Vec<Arc<dyn StoreAdapter>> = self
            .adapters
            .iter()
            .filter(|a| options.includes(a.id()))
            .cloned()
            .collect();
        info!(
            stores = selected.len(),
            skip_enrichment = options.skip_enrichment,
            force_enrich = options.force_enrich,
            "sync started"
        );
        self.emit(SyncEvent::Started {
            stores: selected.len(),
        });

        let runs = self.run_stores(&selected, &token).await;
        let mut result = self.persist(runs, options).await;

        result.cancelled = token.is_cancelled();
        result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            total = result.total_synced,
            errors = result.errors.len(),
            cancelled = result.cancelled,
            duration_ms = result.duration_ms,
            "sync finished"
        );
        self.emit(SyncEvent::Finished {
            total_synced: result.total_synced,
            errors: result.errors.len(),
            cancelled: result.cancelled,
        });
        Ok(result)
    }

    /// One task per adapter, at most `max_concurrent` past the semaphore.
    async fn run_stores(
        &self,
        adapters: &[Arc<dyn StoreAdapter>],
        token: &CancellationToken,
    ) -> Vec<StoreRun> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut set = JoinSet::new();

        for (idx, adapter) in adapters.iter().enumerate() {
            let adapter = Arc::clone(adapter);
            let semaphore = Arc::clone(&semaphore);
            let token = token.clone();
            let events = self.events.clone();

            set.spawn(async move {
                let run = tokio::select! {
                    biased;
                    _ = token.cancelled() => StoreRun::new(adapter.as_ref(), StoreOutcome::Cancelled),
                    run = async {
                        let Ok(_permit) = semaphore.acquire().await else {
                            return StoreRun::new(adapter.as_ref(), StoreOutcome::Cancelled);
                        };
                        send(events.as_ref(), SyncEvent::StoreStarted { store: adapter.id() });
                        run_store(adapter.as_ref()).await
                    } => run,
                };
                if run.outcome == StoreOutcome::Cancelled {
                    debug!(store = %run.name, "store abandoned by cancellation");
                }
                send(
                    events.as_ref(),
                    SyncEvent::StoreFinished {
                        store: run.store,
                        outcome: run.outcome,
                        games: run.games.len(),
                    },
                );
                (idx, run)
            });
        }

        let mut slots: Vec<Option<StoreRun>> = adapters.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, run)) => slots[idx] = Some(run),
                Err(e) => error!(error = %e, "store task failed"),
            }
        }

        slots
            .into_iter()
            .zip(adapters)
            .map(|(slot, adapter)| {
                slot.unwrap_or_else(|| {
                    let mut run = StoreRun::new(adapter.as_ref(), StoreOutcome::Failed);
                    run.error = Some(format!("{}: store task aborted", run.name));
                    run
                })
            })
            .collect()
    }

    /// Folds duplicates, upserts, enriches and builds the result.
    async fn persist(&self, runs: Vec<StoreRun>, options: &SyncOptions) -> SyncResult {
        let mut merged: BTreeMap<GameKey, (usize, StoreGame)> = BTreeMap::new();
        let mut result = SyncResult::default();
        let mut reports = Vec::with_capacity(runs.len());

        for (idx, run) in runs.into_iter().enumerate() {
            result.errors.extend(run.error);
            result.notices.extend(run.notice);
            reports.push(StoreSyncReport::new(run.store, run.outcome));
            for game in run.games {
                match merged.entry(game.key()) {
                    std::collections::btree_map::Entry::Occupied(mut slot) => {
                        debug!(id = %game.id(), "duplicate record folded");
                        slot.get_mut().1.absorb(game);
                    }
                    std::collections::btree_map::Entry::Vacant(slot) => {
                        slot.insert((idx, game));
                    }
                }
            }
        }

        let batch: Vec<(usize, StoreGame)> = merged.into_values().collect();
        let store = Arc::clone(&self.store);
        let upserted = blocking(move || {
            Ok::<_, DbError>(
                batch
                    .into_iter()
                    .map(|(idx, game)| {
                        let stored = store.upsert(&game);
                        if let Err(e) = &stored {
                            warn!(id = %game.id(), error = %e, "upsert failed, record skipped");
                        }
                        (idx, stored)
                    })
                    .collect::<Vec<_>>(),
            )
        })
        .await;

        let mut persisted = Vec::new();
        match upserted {
            Ok(outcomes) => {
                for (idx, stored) in outcomes {
                    match stored {
                        Ok(game) => {
                            reports[idx].synced += 1;
                            persisted.push(game);
                        }
                        Err(_) => reports[idx].failed_records += 1,
                    }
                }
            }
            Err(e) => error!(error = %e, "upsert batch failed"),
        }

        result.total_synced = persisted.len();
        result.stores = reports;
        if options.skip_enrichment {
            debug!("enrichment skipped by request");
        } else {
            self.enrich(persisted, options.force_enrich).await;
        }
        result
    }

    /// Enriches games never enriched before, or all of them when `force`.
    async fn enrich(&self, mut games: Vec<Game>, force: bool) {
        let Some(enricher) = &self.enricher else {
            return;
        };
        if !force {
            games.retain(|g| g.enriched_at.is_none());
        }
        if games.is_empty() {
            return;
        }

        let enriched = match enricher.enrich(&games).await {
            Ok(enriched) => enriched,
            Err(e) => {
                warn!(error = %e, "enrichment skipped");
                return;
            }
        };

        let store = Arc::clone(&self.store);
        let written = blocking(move || {
            let mut written = 0usize;
            for game in &enriched {
                match store.update_details(game) {
                    Ok(()) => written += 1,
                    Err(e) => warn!(id = %game.id, error = %e, "enrichment write-back failed"),
                }
            }
            Ok::<_, DbError>(written)
        })
        .await;
        match written {
            Ok(n) => debug!(enriched = n, "enrichment applied"),
            Err(e) => warn!(error = %e, "enrichment write-back failed"),
        }
    }

    fn emit(&self, event: SyncEvent) {
        send(self.events.as_ref(), event);
    }
}

/// Availability, authentication, then listing for one adapter.
async fn run_store(adapter: &dyn StoreAdapter) -> StoreRun {
    let name = adapter.store_name();

    if !adapter.is_available().await {
        info!(store = %name, helper = adapter.helper_tool(), "helper not available, skipping");
        return StoreRun::new(adapter, StoreOutcome::Unavailable);
    }

    if !adapter.is_authenticated().await {
        let refreshed = match adapter.refresh_auth().await {
            Ok(ok) => ok,
            Err(e) => {
                debug!(store = %name, error = %e, "credential refresh failed");
                false
            }
        };
        if !refreshed {
            info!(store = %name, "not authenticated, skipping");
            let mut run = StoreRun::new(adapter, StoreOutcome::Unauthenticated);
            run.notice = Some(format!("{name}: not authenticated"));
            return run;
        }
        info!(store = %name, "credentials refreshed");
    }

    match adapter.list_games().await {
        Ok(games) => {
            info!(store = %name, count = games.len(), "store listed");
            let store = adapter.id();
            let mut run = StoreRun::new(adapter, StoreOutcome::Synced);
            run.games = games
                .into_iter()
                .filter(|g| {
                    let own = g.store == store;
                    if !own {
                        warn!(store = %name, id = %g.id(), "record for another store dropped");
                    }
                    own && !g.store_id.is_empty()
                })
                .collect();
            run
        }
        Err(StoreError::Spawn(reason)) => {
            warn!(store = %name, reason, "helper could not be started, treating as unavailable");
            StoreRun::new(adapter, StoreOutcome::Unavailable)
        }
        Err(e) => {
            warn!(store = %name, error = %e, "store listing failed");
            let mut run = StoreRun::new(adapter, StoreOutcome::Failed);
            run.error = Some(format!("{name}: {e}"));
            run
        }
    }
}

fn send(events: Option<&mpsc::Sender<SyncEvent>>, event: SyncEvent) {
    let Some(tx) = events else {
        return;
    };
    if let Err(e) = tx.try_send(event) {
        debug!(error = %e, "sync event dropped");
    }
}

/// Runs persistence work off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, DbError>
where
    F: FnOnce() -> Result<T, DbError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DbError::Io(std::io::Error::other(e)))?
}
