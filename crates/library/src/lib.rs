//! Boundary facade consumed by the UI layer.
//!
//! [`Library`] wires the store registry, the sync orchestrator, the game
//! database and (optionally) the login flow controller together, and
//! broadcasts [`LibraryEvent`]s to subscribers.

pub mod error;
pub mod event;
pub mod library;

pub use error::LibraryError;
pub use event::LibraryEvent;
pub use library::{Library, LibraryBuilder};
