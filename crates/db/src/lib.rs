//! Durable store of canonical game records.
//!
//! One `games` table keyed by `(store, store_id)`. Calls are blocking;
//! async callers go through `spawn_blocking`.

pub mod error;
pub mod sqlite;

use chrono::{DateTime, Utc};
use pixxiden_model::{Game, StoreGame, StoreId};

pub use error::DbError;
pub use sqlite::SqliteGameStore;

pub trait GameStore: Send + Sync {
    /// Cheap reachability check run before every sync pass.
    fn ping(&self) -> Result<(), DbError>;

    /// Inserts or merges one adapter record and returns the stored row.
    ///
    /// Absent fields in `game` keep the stored value. An explicit
    /// `installed = false` clears the install and executable paths.
    fn upsert(&self, game: &StoreGame) -> Result<Game, DbError>;

    /// All games, ordered by title.
    fn get_all(&self) -> Result<Vec<Game>, DbError>;

    fn get_by_id(&self, id: &str) -> Result<Option<Game>, DbError>;

    fn get_by_store(&self, store: StoreId) -> Result<Vec<Game>, DbError>;

    /// Case-insensitive substring match on title or developer. A blank
    /// query returns everything.
    fn search(&self, query: &str) -> Result<Vec<Game>, DbError>;

    /// Games with a launch recorded, most recent first.
    fn recently_played(&self, limit: usize) -> Result<Vec<Game>, DbError>;

    fn favorites(&self) -> Result<Vec<Game>, DbError>;

    fn set_favorite(&self, id: &str, favorite: bool) -> Result<(), DbError>;

    /// Flips the favorite flag and returns the new value.
    fn toggle_favorite(&self, id: &str) -> Result<bool, DbError>;

    fn set_installed(
        &self,
        id: &str,
        installed: bool,
        install_path: Option<&str>,
    ) -> Result<(), DbError>;

    fn record_launch(&self, id: &str, at: DateTime<Utc>) -> Result<(), DbError>;

    fn add_play_time(&self, id: &str, minutes: u64) -> Result<(), DbError>;

    fn set_custom_executable(&self, id: &str, path: Option<&str>) -> Result<(), DbError>;

    /// Writes back descriptive metadata and stamps `enriched_at`; `None`
    /// fields are left alone.
    fn update_details(&self, game: &Game) -> Result<(), DbError>;

    /// Returns whether a row was removed.
    fn delete(&self, id: &str) -> Result<bool, DbError>;

    fn count(&self) -> Result<usize, DbError>;
}
