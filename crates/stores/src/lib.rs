//! Store adapters: one per storefront, behind [`StoreAdapter`].
//!
//! - [`LegendaryAdapter`]: Epic Games Store via `legendary`
//! - [`GogdlAdapter`]: GOG via `gogdl` and the GOG embed API
//! - [`NileAdapter`]: Amazon Games via `nile`
//! - [`SteamAdapter`]: local Steam installation
//!
//! All helper calls go through [`pixxiden_sidecar::SidecarRunner`], so a
//! hung helper is killed at its deadline.

pub mod adapter;
pub mod config;
pub mod error;
pub mod gogdl;
mod helper;
pub mod legendary;
pub mod locate;
pub mod nile;
pub mod progress;
pub mod registry;
pub mod steam;

pub use adapter::{AuthRequest, BoxFuture, InstallProgress, InteractiveAuth, StoreAdapter};
pub use config::{StoreSettings, StoresConfig};
pub use error::StoreError;
pub use gogdl::GogdlAdapter;
pub use helper::INSTALL_TIMEOUT;
pub use legendary::LegendaryAdapter;
pub use nile::NileAdapter;
pub use registry::StoreRegistry;
pub use steam::SteamAdapter;
