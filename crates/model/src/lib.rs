//! Canonical library types shared by every Pixxiden crate.
//!
//! - [`Game`] is the persisted, store-agnostic record returned to the UI.
//! - [`StoreGame`] is the sparse record an adapter produces; absent fields
//!   never overwrite richer local data.
//! - [`StoreId`] / [`StoreStatus`] describe the storefronts.
//! - [`SyncResult`] is the aggregate outcome of one sync pass.

pub mod game;
pub mod store;
pub mod sync;

pub use game::{Game, GameKey, StoreGame};
pub use store::{ParseStoreIdError, StoreId, StoreStatus};
pub use sync::{StoreOutcome, StoreSyncReport, SyncResult};
