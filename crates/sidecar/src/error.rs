//! Error types for helper process invocations.

use std::time::Duration;

/// Errors produced while running a helper process.
///
/// A non-zero exit status is not an error at this level; see
/// [`SidecarOutput::success`](crate::SidecarOutput::success).
#[derive(Debug, thiserror::Error)]
pub enum SidecarError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {}s", after.as_secs())]
    Timeout {
        program: String,
        after: Duration,
        /// Pid of the killed child, if the OS reported one.
        pid: Option<u32>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SidecarError {
    /// True when the program could not be found on disk.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SidecarError::Spawn { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }
}
