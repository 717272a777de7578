//! Embedded browser surface, supplied by the host application.

use std::sync::Arc;

use pixxiden_stores::BoxFuture;
use tokio::sync::mpsc;
use tracing::debug;

/// A surface to open for one login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceRequest {
    pub label: String,
    pub url: String,
    pub title: String,
}

/// What the surface reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// The surface navigated to this URL.
    Navigated(String),
    /// The user closed the window.
    CloseRequested,
    Failed(String),
}

pub trait WebviewHost: Send + Sync {
    /// Opens a surface and returns its event stream.
    fn open<'a>(
        &'a self,
        request: &'a SurfaceRequest,
    ) -> BoxFuture<'a, Result<mpsc::Receiver<SurfaceEvent>, String>>;

    /// Closes the surface with this label. Unknown labels are ignored.
    fn close(&self, label: &str);
}

/// Owns an open surface; closes it exactly once.
pub struct SurfaceGuard {
    host: Arc<dyn WebviewHost>,
    label: String,
    closed: bool,
}

impl SurfaceGuard {
    pub fn new(host: Arc<dyn WebviewHost>, label: impl Into<String>) -> Self {
        Self {
            host,
            label: label.into(),
            closed: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn close(mut self) {
        self.close_once();
    }

    fn close_once(&mut self) {
        if !self.closed {
            self.closed = true;
            debug!(label = %self.label, "closing login surface");
            self.host.close(&self.label);
        }
    }
}

impl Drop for SurfaceGuard {
    fn drop(&mut self) {
        self.close_once();
    }
}
