use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use pixxiden_model::{Game, StoreGame, StoreId};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use crate::GameStore;
use crate::error::DbError;

const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS games (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        store TEXT NOT NULL,
        store_id TEXT NOT NULL,
        installed INTEGER NOT NULL DEFAULT 0,
        install_path TEXT,
        executable_path TEXT,
        custom_executable TEXT,
        developer TEXT,
        publisher TEXT,
        description TEXT,
        release_date TEXT,
        cover_url TEXT,
        background_url TEXT,
        play_time_minutes INTEGER NOT NULL DEFAULT 0,
        last_played TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        is_favorite INTEGER NOT NULL DEFAULT 0,
        enriched_at TEXT,
        UNIQUE(store, store_id)
    );

    CREATE INDEX IF NOT EXISTS idx_games_store ON games(store);
";

/// Columns added after the first schema revision.
const ADDED_COLUMNS: &[(&str, &str)] = &[
    ("executable_path", "TEXT"),
    ("custom_executable", "TEXT"),
    ("is_favorite", "INTEGER NOT NULL DEFAULT 0"),
    ("enriched_at", "TEXT"),
];

const COLUMNS: &str = "id, title, store, store_id, installed, install_path, executable_path, \
     custom_executable, developer, publisher, description, release_date, cover_url, \
     background_url, play_time_minutes, last_played, created_at, updated_at, is_favorite, \
     enriched_at";

/// Single statement per record, so a merge never observes a half-written row.
const UPSERT: &str = r"
    INSERT INTO games (
        id, title, store, store_id, installed, install_path, executable_path,
        developer, publisher, description, release_date, cover_url, background_url,
        play_time_minutes, last_played, created_at, updated_at
    )
    VALUES (?1, ?2, ?3, ?4, COALESCE(?5, 0), ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
            COALESCE(?14, 0), ?15, ?16, ?16)
    ON CONFLICT(store, store_id) DO UPDATE SET
        title = CASE WHEN excluded.title <> '' THEN excluded.title ELSE games.title END,
        installed = COALESCE(?5, games.installed),
        install_path = CASE WHEN ?5 = 0 THEN NULL ELSE COALESCE(?6, games.install_path) END,
        executable_path = CASE WHEN ?5 = 0 THEN NULL
                               ELSE COALESCE(?7, games.executable_path) END,
        developer = COALESCE(?8, games.developer),
        publisher = COALESCE(?9, games.publisher),
        description = COALESCE(?10, games.description),
        release_date = COALESCE(?11, games.release_date),
        cover_url = COALESCE(?12, games.cover_url),
        background_url = COALESCE(?13, games.background_url),
        play_time_minutes = COALESCE(?14, games.play_time_minutes),
        last_played = COALESCE(?15, games.last_played),
        updated_at = ?16
";

/// SQLite-backed [`GameStore`].
pub struct SqliteGameStore {
    conn: Mutex<Connection>,
}

impl SqliteGameStore {
    /// Opens (creating if needed) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        migrate(&conn)?;

        info!(path = %path.display(), journal = %mode, "game database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, for tests and dry runs.
    pub fn in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    fn query_games(
        &self,
        tail: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Game>, DbError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {COLUMNS} FROM games {tail}"))?;
        let games = stmt.query_map(params, row_to_game)?;
        games.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Runs an `UPDATE ... WHERE id = ?1`, failing when no row matched.
    fn update(&self, id: &str, sql: &str, params: impl rusqlite::Params) -> Result<(), DbError> {
        let changed = self.conn()?.execute(sql, params)?;
        if changed == 0 {
            return Err(DbError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

fn migrate(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(SCHEMA)?;
    for (column, decl) in ADDED_COLUMNS {
        let present: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM pragma_table_info('games') WHERE name = ?1",
            [column],
            |row| row.get(0),
        )?;
        if !present {
            info!(column, "adding column to games table");
            conn.execute_batch(&format!("ALTER TABLE games ADD COLUMN {column} {decl}"))?;
        }
    }
    Ok(())
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn to_sql_minutes(minutes: u64) -> i64 {
    i64::try_from(minutes).unwrap_or(i64::MAX)
}

/// `%query%` with LIKE wildcards in the query taken literally.
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_time(idx: usize, text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn row_to_game(row: &Row<'_>) -> rusqlite::Result<Game> {
    let store: String = row.get(2)?;
    let store = store
        .parse::<StoreId>()
        .map_err(|e| conversion_error(2, e))?;
    let last_played = row
        .get::<_, Option<String>>(15)?
        .map(|s| parse_time(15, &s))
        .transpose()?;
    let created_at: String = row.get(16)?;
    let updated_at: String = row.get(17)?;
    let enriched_at = row
        .get::<_, Option<String>>(19)?
        .map(|s| parse_time(19, &s))
        .transpose()?;

    Ok(Game {
        id: row.get(0)?,
        title: row.get(1)?,
        store,
        store_id: row.get(3)?,
        installed: row.get(4)?,
        install_path: row.get(5)?,
        executable_path: row.get(6)?,
        custom_executable: row.get(7)?,
        developer: row.get(8)?,
        publisher: row.get(9)?,
        description: row.get(10)?,
        release_date: row.get(11)?,
        cover_url: row.get(12)?,
        background_url: row.get(13)?,
        play_time_minutes: u64::try_from(row.get::<_, i64>(14)?).unwrap_or(0),
        last_played,
        is_favorite: row.get(18)?,
        enriched_at,
        created_at: parse_time(16, &created_at)?,
        updated_at: parse_time(17, &updated_at)?,
        download_progress: None,
    })
}

impl GameStore for SqliteGameStore {
    fn ping(&self) -> Result<(), DbError> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    fn upsert(&self, game: &StoreGame) -> Result<Game, DbError> {
        let id = game.id();
        let conn = self.conn()?;
        let stored = conn.query_row(
            &format!("{UPSERT} RETURNING {COLUMNS}"),
            params![
                id,
                game.title,
                game.store.as_str(),
                game.store_id,
                game.installed,
                game.install_path,
                game.executable_path,
                game.developer,
                game.publisher,
                game.description,
                game.release_date,
                game.cover_url,
                game.background_url,
                game.play_time_minutes.map(to_sql_minutes),
                game.last_played.map(|t| t.to_rfc3339()),
                now(),
            ],
            row_to_game,
        )?;
        debug!(id = %stored.id, installed = stored.installed, "game upserted");
        Ok(stored)
    }

    fn get_all(&self) -> Result<Vec<Game>, DbError> {
        self.query_games("ORDER BY title COLLATE NOCASE, id", [])
    }

    fn get_by_id(&self, id: &str) -> Result<Option<Game>, DbError> {
        Ok(self.query_games("WHERE id = ?1", [id])?.into_iter().next())
    }

    fn get_by_store(&self, store: StoreId) -> Result<Vec<Game>, DbError> {
        self.query_games(
            "WHERE store = ?1 ORDER BY title COLLATE NOCASE, id",
            [store.as_str()],
        )
    }

    fn search(&self, query: &str) -> Result<Vec<Game>, DbError> {
        let query = query.trim();
        if query.is_empty() {
            return self.get_all();
        }
        self.query_games(
            r"WHERE title LIKE ?1 ESCAPE '\' OR developer LIKE ?1 ESCAPE '\'
              ORDER BY title COLLATE NOCASE, id",
            [like_pattern(query)],
        )
    }

    fn recently_played(&self, limit: usize) -> Result<Vec<Game>, DbError> {
        self.query_games(
            "WHERE last_played IS NOT NULL ORDER BY last_played DESC, id LIMIT ?1",
            [i64::try_from(limit).unwrap_or(i64::MAX)],
        )
    }

    fn favorites(&self) -> Result<Vec<Game>, DbError> {
        self.query_games("WHERE is_favorite = 1 ORDER BY title COLLATE NOCASE, id", [])
    }

    fn set_favorite(&self, id: &str, favorite: bool) -> Result<(), DbError> {
        self.update(
            id,
            "UPDATE games SET is_favorite = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, favorite, now()],
        )
    }

    fn toggle_favorite(&self, id: &str) -> Result<bool, DbError> {
        let conn = self.conn()?;
        conn.query_row(
            r"UPDATE games SET is_favorite = NOT is_favorite, updated_at = ?2
              WHERE id = ?1 RETURNING is_favorite",
            params![id, now()],
            |row| row.get::<_, bool>(0),
        )
        .optional()?
        .ok_or_else(|| DbError::NotFound(id.to_string()))
    }

    fn set_installed(
        &self,
        id: &str,
        installed: bool,
        install_path: Option<&str>,
    ) -> Result<(), DbError> {
        self.update(
            id,
            r"
            UPDATE games SET
                installed = ?2,
                install_path = CASE WHEN ?2 THEN COALESCE(?3, install_path) ELSE NULL END,
                executable_path = CASE WHEN ?2 THEN executable_path ELSE NULL END,
                updated_at = ?4
            WHERE id = ?1
            ",
            params![id, installed, install_path, now()],
        )
    }

    fn record_launch(&self, id: &str, at: DateTime<Utc>) -> Result<(), DbError> {
        self.update(
            id,
            "UPDATE games SET last_played = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, at.to_rfc3339(), now()],
        )
    }

    fn add_play_time(&self, id: &str, minutes: u64) -> Result<(), DbError> {
        self.update(
            id,
            r"
            UPDATE games SET
                play_time_minutes = play_time_minutes + ?2,
                updated_at = ?3
            WHERE id = ?1
            ",
            params![id, to_sql_minutes(minutes), now()],
        )
    }

    fn set_custom_executable(&self, id: &str, path: Option<&str>) -> Result<(), DbError> {
        self.update(
            id,
            "UPDATE games SET custom_executable = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, path, now()],
        )
    }

    fn update_details(&self, game: &Game) -> Result<(), DbError> {
        self.update(
            &game.id,
            r"
            UPDATE games SET
                developer = COALESCE(?2, developer),
                publisher = COALESCE(?3, publisher),
                description = COALESCE(?4, description),
                release_date = COALESCE(?5, release_date),
                cover_url = COALESCE(?6, cover_url),
                background_url = COALESCE(?7, background_url),
                enriched_at = ?8,
                updated_at = ?8
            WHERE id = ?1
            ",
            params![
                game.id,
                game.developer,
                game.publisher,
                game.description,
                game.release_date,
                game.cover_url,
                game.background_url,
                now(),
            ],
        )
    }

    fn delete(&self, id: &str) -> Result<bool, DbError> {
        let removed = self.conn()?.execute("DELETE FROM games WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }

    fn count(&self) -> Result<usize, DbError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM games", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}
