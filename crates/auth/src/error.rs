use thiserror::Error;

use crate::session::AuthStatus;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0} does not support interactive login")]
    NotSupported(String),

    #[error("could not start login: {0}")]
    Begin(String),

    #[error("could not open login surface: {0}")]
    Surface(String),

    #[error("invalid login transition {from:?} -> {to:?}")]
    InvalidTransition { from: AuthStatus, to: AuthStatus },

    #[error("login completion failed: {0}")]
    Completion(String),

    #[error("login rejected: {0}")]
    Rejected(String),

    #[error("login timed out after {0}s")]
    TimedOut(u64),

    #[error("login cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            AuthError::NotSupported("steam".into()).to_string(),
            "steam does not support interactive login"
        );
        assert_eq!(AuthError::TimedOut(600).to_string(), "login timed out after 600s");
        let err = AuthError::InvalidTransition {
            from: AuthStatus::Idle,
            to: AuthStatus::Succeeded,
        };
        assert_eq!(err.to_string(), "invalid login transition Idle -> Succeeded");
    }
}
