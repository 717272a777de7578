use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use pixxiden_model::StoreId;
use pixxiden_stores::{AuthRequest, StoreAdapter};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AuthError;
use crate::host::{SurfaceEvent, SurfaceGuard, SurfaceRequest, WebviewHost};
use crate::redirect::{Redirect, classify};
use crate::session::{AuthSession, AuthStatus};

/// Hard ceiling for one login.
pub const MAX_AUTH_TIMEOUT: Duration = Duration::from_secs(600);

/// Pause between cancelling a previous session and opening a new surface.
pub const SUPERSEDE_DELAY: Duration = Duration::from_millis(500);

type ActiveSessions = HashMap<StoreId, (Uuid, CancellationToken)>;

/// Drives interactive logins; at most one live session per store.
pub struct AuthFlowController {
    host: Arc<dyn WebviewHost>,
    timeout: Duration,
    active: Mutex<ActiveSessions>,
}

enum Wait {
    Code(String),
    Ended(AuthStatus, String),
}

impl AuthFlowController {
    pub fn new(host: Arc<dyn WebviewHost>) -> Self {
        Self {
            host,
            timeout: MAX_AUTH_TIMEOUT,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the login timeout, clamped to [`MAX_AUTH_TIMEOUT`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.min(MAX_AUTH_TIMEOUT);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_active(&self, store: StoreId) -> bool {
        self.sessions().contains_key(&store)
    }

    /// Cancels the live session for `store`, if any.
    pub fn cancel(&self, store: StoreId) -> bool {
        match self.sessions().get(&store) {
            Some((id, token)) => {
                info!(store = %store, session = %id, "cancelling login");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Runs one login to completion.
    ///
    /// Setup failures are errors; how the login itself ended is recorded
    /// in the returned session (see [`AuthSession::result`]).
    pub async fn authenticate(&self, adapter: &dyn StoreAdapter) -> Result<AuthSession, AuthError> {
        let store = adapter.id();
        let auth = adapter
            .interactive_auth()
            .ok_or_else(|| AuthError::NotSupported(adapter.store_name().to_string()))?;

        let mut session = AuthSession::new(store);
        let (token, superseded) = self.register(store, session.id);
        let _registration = Registration {
            active: &self.active,
            store,
            id: session.id,
        };
        if superseded {
            debug!(store = %store, "previous login cancelled, waiting before reopening");
            tokio::time::sleep(SUPERSEDE_DELAY).await;
        }

        session.transition(AuthStatus::Opening)?;
        let request = auth
            .begin_auth()
            .await
            .map_err(|e| AuthError::Begin(e.to_string()))?;
        if token.is_cancelled() {
            return Err(AuthError::Cancelled);
        }

        let surface = SurfaceRequest {
            label: session.label.clone(),
            url: request.url.clone(),
            title: request.title.clone(),
        };
        let mut events = self
            .host
            .open(&surface)
            .await
            .map_err(AuthError::Surface)?;
        let guard = SurfaceGuard::new(Arc::clone(&self.host), session.label.clone());
        session.transition(AuthStatus::AwaitingRedirect)?;
        info!(store = %store, session = %session.id, "login surface open");

        let wait = self.await_redirect(&request, &mut events, &token).await;
        guard.close();

        match wait {
            Wait::Code(code) => {
                session.code = Some(code.clone());
                match auth.complete_auth(&code).await {
                    Ok(()) => session.finish(AuthStatus::Succeeded, None)?,
                    Err(e) => {
                        warn!(store = %store, error = %e, "login completion failed");
                        session.finish(AuthStatus::Failed, Some(e.to_string()))?;
                    }
                }
            }
            Wait::Ended(status, reason) => {
                debug!(store = %store, ?status, reason, "login ended without a code");
                session.finish(status, Some(reason))?;
            }
        }
        session.transition(AuthStatus::Closed)?;
        info!(store = %store, outcome = ?session.outcome, "login finished");
        Ok(session)
    }

    async fn await_redirect(
        &self,
        request: &AuthRequest,
        events: &mut mpsc::Receiver<SurfaceEvent>,
        token: &CancellationToken,
    ) -> Wait {
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    return Wait::Ended(AuthStatus::Cancelled, "login cancelled".into());
                }
                _ = &mut deadline => {
                    return Wait::Ended(
                        AuthStatus::TimedOut,
                        format!("no redirect within {}s", self.timeout.as_secs()),
                    );
                }
                event = events.recv() => match event {
                    Some(SurfaceEvent::Navigated(url)) => {
                        match classify(&url, &request.redirect_prefix, &request.code_param) {
                            Redirect::Intermediate => debug!(url, "login navigation"),
                            Redirect::Code(code) => return Wait::Code(code),
                            Redirect::Rejected(reason) => {
                                return Wait::Ended(AuthStatus::Failed, reason);
                            }
                        }
                    }
                    Some(SurfaceEvent::CloseRequested) => {
                        return Wait::Ended(AuthStatus::Cancelled, "closed by user".into());
                    }
                    Some(SurfaceEvent::Failed(reason)) => {
                        return Wait::Ended(AuthStatus::Failed, reason);
                    }
                    None => {
                        return Wait::Ended(AuthStatus::Failed, "login surface went away".into());
                    }
                },
            }
        }
    }

    fn sessions(&self) -> MutexGuard<'_, ActiveSessions> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a new session, cancelling any previous one for the store.
    fn register(&self, store: StoreId, id: Uuid) -> (CancellationToken, bool) {
        let token = CancellationToken::new();
        let previous = self.sessions().insert(store, (id, token.clone()));
        let superseded = match previous {
            Some((_, old)) => {
                old.cancel();
                true
            }
            None => false,
        };
        (token, superseded)
    }
}

/// Removes the session entry on every exit path, unless superseded.
struct Registration<'a> {
    active: &'a Mutex<ActiveSessions>,
    store: StoreId,
    id: Uuid,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut map = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if map.get(&self.store).is_some_and(|(id, _)| *id == self.id) {
            map.remove(&self.store);
        }
    }
}
