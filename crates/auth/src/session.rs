//! Login session state machine.
//!
//! `Idle -> Opening -> AwaitingRedirect -> {Succeeded | TimedOut | Failed | Cancelled} -> Closed`
//!
//! Setup failures may also jump from `Opening` straight to `Failed` or
//! `Cancelled`.

use pixxiden_model::StoreId;
use serde::Serialize;
use uuid::Uuid;

use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    Idle,
    Opening,
    AwaitingRedirect,
    Succeeded,
    TimedOut,
    Failed,
    Cancelled,
    Closed,
}

impl AuthStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::TimedOut | Self::Failed | Self::Cancelled
        )
    }

    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_transition(self, next: AuthStatus) -> bool {
        use AuthStatus::*;
        match (self, next) {
            (Idle, Opening) => true,
            (Opening, AwaitingRedirect | Failed | Cancelled) => true,
            (AwaitingRedirect, next) if next.is_terminal() => true,
            (current, Closed) => current.is_terminal(),
            _ => false,
        }
    }
}

/// One interactive login against one store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub id: Uuid,
    pub store: StoreId,
    /// Surface label, unique per session.
    pub label: String,
    #[serde(skip_serializing)]
    pub code: Option<String>,
    pub status: AuthStatus,
    /// Terminal status reached before `Closed`.
    pub outcome: Option<AuthStatus>,
    pub error: Option<String>,
}

impl AuthSession {
    pub fn new(store: StoreId) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            store,
            label: format!("auth-{store}-{}", id.simple()),
            code: None,
            status: AuthStatus::Idle,
            outcome: None,
            error: None,
        }
    }

    pub fn transition(&mut self, next: AuthStatus) -> Result<(), AuthError> {
        if !self.status.can_transition(next) {
            return Err(AuthError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        if next.is_terminal() {
            self.outcome = Some(next);
        }
        self.status = next;
        Ok(())
    }

    /// Moves to a terminal status, recording `error` when given.
    pub fn finish(&mut self, next: AuthStatus, error: Option<String>) -> Result<(), AuthError> {
        self.transition(next)?;
        self.error = error;
        Ok(())
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == Some(AuthStatus::Succeeded)
    }

    /// Maps the terminal outcome onto a result.
    pub fn result(&self, timeout_secs: u64) -> Result<(), AuthError> {
        let message = || self.error.clone().unwrap_or_default();
        match self.outcome {
            Some(AuthStatus::Succeeded) => Ok(()),
            Some(AuthStatus::TimedOut) => Err(AuthError::TimedOut(timeout_secs)),
            Some(AuthStatus::Cancelled) => Err(AuthError::Cancelled),
            Some(AuthStatus::Failed) if self.code.is_some() => Err(AuthError::Completion(message())),
            _ => Err(AuthError::Rejected(message())),
        }
    }
}
