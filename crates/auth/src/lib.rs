//! Interactive OAuth for stores that need a browser round-trip.
//!
//! [`AuthFlowController`] opens a surface through the host's
//! [`WebviewHost`], watches navigations for the store's redirect, and hands
//! the extracted code to the adapter's
//! [`InteractiveAuth::complete_auth`](pixxiden_stores::InteractiveAuth::complete_auth).

pub mod controller;
pub mod error;
pub mod host;
pub mod redirect;
pub mod session;

pub use controller::{AuthFlowController, MAX_AUTH_TIMEOUT, SUPERSEDE_DELAY};
pub use error::AuthError;
pub use host::{SurfaceEvent, SurfaceGuard, SurfaceRequest, WebviewHost};
pub use session::{AuthSession, AuthStatus};
