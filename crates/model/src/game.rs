use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::StoreId;

/// Upsert key of a game: the store plus the store's own app id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GameKey {
    pub store: StoreId,
    pub store_id: String,
}

impl GameKey {
    pub fn new(store: StoreId, store_id: impl Into<String>) -> Self {
        Self {
            store,
            store_id: store_id.into(),
        }
    }

    /// Local identifier, derived only from the key so repeated syncs
    /// always land on the same row.
    pub fn id(&self) -> String {
        format!("{}-{}", self.store.as_str(), self.store_id)
    }
}

/// A game as reported by one store adapter.
///
/// Only the key and title are mandatory. `None` means "the store did not
/// say", which the persistence merge treats differently from an explicit
/// value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreGame {
    pub store: StoreId,
    pub store_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub developer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub play_time_minutes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_played: Option<DateTime<Utc>>,
}

impl StoreGame {
    /// Creates a record with only the mandatory fields set.
    pub fn new(store: StoreId, store_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            store,
            store_id: store_id.into(),
            title: title.into(),
            installed: None,
            install_path: None,
            executable_path: None,
            developer: None,
            publisher: None,
            description: None,
            release_date: None,
            cover_url: None,
            background_url: None,
            play_time_minutes: None,
            last_played: None,
        }
    }

    pub fn key(&self) -> GameKey {
        GameKey::new(self.store, self.store_id.clone())
    }

    pub fn id(&self) -> String {
        self.key().id()
    }

    /// Folds a later report of the same game into this one.
    ///
    /// Fields present in `other` win; absent fields keep the current value.
    pub fn absorb(&mut self, other: StoreGame) {
        debug_assert_eq!(self.key(), other.key());

        if !other.title.is_empty() {
            self.title = other.title;
        }
        fold(&mut self.installed, other.installed);
        fold(&mut self.install_path, other.install_path);
        fold(&mut self.executable_path, other.executable_path);
        fold(&mut self.developer, other.developer);
        fold(&mut self.publisher, other.publisher);
        fold(&mut self.description, other.description);
        fold(&mut self.release_date, other.release_date);
        fold(&mut self.cover_url, other.cover_url);
        fold(&mut self.background_url, other.background_url);
        fold(&mut self.play_time_minutes, other.play_time_minutes);
        fold(&mut self.last_played, other.last_played);
    }
}

fn fold<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

/// The canonical, persisted record of one owned title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: String,
    pub title: String,
    pub store: StoreId,
    pub store_id: String,
    pub installed: bool,
    pub install_path: Option<String>,
    pub executable_path: Option<String>,
    /// User-chosen executable, never touched by sync.
    pub custom_executable: Option<String>,
    pub developer: Option<String>,
    pub publisher: Option<String>,
    pub description: Option<String>,
    pub release_date: Option<String>,
    pub cover_url: Option<String>,
    pub background_url: Option<String>,
    pub play_time_minutes: u64,
    pub last_played: Option<DateTime<Utc>>,
    pub is_favorite: bool,
    /// Last metadata enrichment; `None` until enriched once.
    pub enriched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// UI-only download progress (0-100). Not a database column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_progress: Option<f32>,
}

impl Game {
    pub fn key(&self) -> GameKey {
        GameKey::new(self.store, self.store_id.clone())
    }

    /// Executable to start: the user override if any, else the detected one.
    pub fn launch_executable(&self) -> Option<&str> {
        self.custom_executable
            .as_deref()
            .or(self.executable_path.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_derived_from_key() {
        let a = StoreGame::new(StoreId::Gog, "g1", "DREDGE");
        let b = StoreGame::new(StoreId::Gog, "g1", "DREDGE (renamed)");
        assert_eq!(a.id(), "gog-g1");
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), StoreGame::new(StoreId::Epic, "g1", "DREDGE").id());
    }

    #[test]
    fn absorb_keeps_fields_the_later_report_omits() {
        let mut first = StoreGame::new(StoreId::Epic, "fn", "Fortnite");
        first.developer = Some("Epic".into());
        first.play_time_minutes = Some(30);

        let mut second = StoreGame::new(StoreId::Epic, "fn", "Fortnite");
        second.installed = Some(true);

        first.absorb(second);
        assert_eq!(first.developer.as_deref(), Some("Epic"));
        assert_eq!(first.play_time_minutes, Some(30));
        assert_eq!(first.installed, Some(true));
    }

    #[test]
    fn store_game_omits_absent_fields() {
        let game = StoreGame::new(StoreId::Amazon, "B0ABC", "Quake");
        let value = serde_json::to_value(&game).unwrap();
        assert_eq!(value["storeId"], "B0ABC");
        assert!(value.get("installed").is_none());
        assert!(value.get("playTimeMinutes").is_none());
    }

    #[test]
    fn custom_executable_wins_for_launch() {
        let now = Utc::now();
        let mut game = Game {
            id: "gog-1".into(),
            title: "T".into(),
            store: StoreId::Gog,
            store_id: "1".into(),
            installed: true,
            install_path: Some("/games/t".into()),
            executable_path: Some("/games/t/start.sh".into()),
            custom_executable: None,
            developer: None,
            publisher: None,
            description: None,
            release_date: None,
            cover_url: None,
            background_url: None,
            play_time_minutes: 0,
            last_played: None,
            is_favorite: false,
            enriched_at: None,
            created_at: now,
            updated_at: now,
            download_progress: None,
        };
        assert_eq!(game.launch_executable(), Some("/games/t/start.sh"));

        game.custom_executable = Some("/games/t/bin/t.x86_64".into());
        assert_eq!(game.launch_executable(), Some("/games/t/bin/t.x86_64"));
    }
}
