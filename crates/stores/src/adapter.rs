//! Capability interface every store variant implements.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use pixxiden_model::{StoreGame, StoreId, StoreStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::StoreError;

/// Boxed, sendable future returned by adapter methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Install progress reported by a helper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallProgress {
    pub app_id: String,
    /// 0-100.
    pub percent: f32,
    pub downloaded: Option<String>,
    pub total: Option<String>,
    pub eta: Option<String>,
}

/// What an embedded browser surface needs to run one OAuth login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub url: String,
    /// A navigation starting with this prefix ends the flow.
    pub redirect_prefix: String,
    /// Query parameter carrying the authorization code.
    pub code_param: String,
    pub title: String,
}

/// Browser-based login, for stores that need it.
pub trait InteractiveAuth: Send + Sync {
    /// Prepares a login and returns where to send the user.
    fn begin_auth(&self) -> BoxFuture<'_, Result<AuthRequest, StoreError>>;

    /// Exchanges the authorization code for stored credentials.
    fn complete_auth<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// One storefront, fronted by a helper tool or local files.
///
/// Implementations hold no per-call state beyond their configuration, so
/// the same adapter can serve concurrent sync and install calls.
pub trait StoreAdapter: Send + Sync {
    fn id(&self) -> StoreId;

    /// Name used in sync errors and notices.
    fn store_name(&self) -> &str {
        self.id().as_str()
    }

    fn display_name(&self) -> &str {
        self.id().display_name()
    }

    fn helper_tool(&self) -> &str {
        self.id().helper_tool()
    }

    /// Helper present and minimally functional.
    fn is_available(&self) -> BoxFuture<'_, bool>;

    /// Helper holds valid stored credentials.
    fn is_authenticated(&self) -> BoxFuture<'_, bool>;

    /// Attempts a non-interactive credential refresh.
    ///
    /// Returns `Ok(true)` when the store is authenticated afterwards.
    fn refresh_auth(&self) -> BoxFuture<'_, Result<bool, StoreError>> {
        Box::pin(async { Ok(false) })
    }

    /// Lists owned games in normalized form.
    fn list_games(&self) -> BoxFuture<'_, Result<Vec<StoreGame>, StoreError>>;

    fn install<'a>(
        &'a self,
        app_id: &'a str,
        path: Option<&'a Path>,
        progress: Option<mpsc::Sender<InstallProgress>>,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    fn uninstall<'a>(&'a self, app_id: &'a str) -> BoxFuture<'a, Result<(), StoreError>>;

    fn launch<'a>(&'a self, app_id: &'a str) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Drops stored credentials.
    fn logout(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        let name = self.store_name().to_string();
        Box::pin(async move { Err(StoreError::Unsupported(format!("{name} logout"))) })
    }

    fn interactive_auth(&self) -> Option<&dyn InteractiveAuth> {
        None
    }

    /// Computes a fresh descriptor.
    fn status(&self) -> BoxFuture<'_, StoreStatus> {
        Box::pin(async move {
            let available = self.is_available().await;
            let authenticated = available && self.is_authenticated().await;
            StoreStatus {
                id: self.id(),
                name: self.display_name().to_string(),
                available,
                authenticated,
                helper_tool: self.helper_tool().to_string(),
            }
        })
    }
}
