//! Error types for store adapter operations.

use pixxiden_sidecar::SidecarError;

/// Errors produced by a store adapter.
///
/// The `Display` text is what ends up in a sync result, so it stays
/// short; diagnostic detail goes to the log.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Helper missing or not executable. Treated as "store unavailable".
    #[error("helper unavailable: {0}")]
    Spawn(String),

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("helper exited with code {code:?}")]
    HelperFailed { code: Option<i32>, stderr: String },

    #[error("malformed output")]
    MalformedOutput { reason: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("game not installed: {0}")]
    NotInstalled(String),

    #[error("not supported: {0}")]
    Unsupported(String),

    #[error("authentication failed: {0}")]
    Auth(String),
}

impl StoreError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        StoreError::MalformedOutput {
            reason: reason.into(),
        }
    }

    /// Builds a `HelperFailed` from a finished helper's output.
    pub fn helper_failed(output: &pixxiden_sidecar::SidecarOutput) -> Self {
        StoreError::HelperFailed {
            code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        }
    }
}

impl From<SidecarError> for StoreError {
    fn from(e: SidecarError) -> Self {
        match e {
            SidecarError::Spawn { program, source } => {
                StoreError::Spawn(format!("{program}: {source}"))
            }
            SidecarError::Timeout { after, .. } => StoreError::Timeout(after.as_secs()),
            SidecarError::Io(e) => StoreError::Io(e),
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Http(e.to_string())
    }
}
