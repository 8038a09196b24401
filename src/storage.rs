//! Client-side persistence: the theme preference and the saved transcript.
//!
//! Both live under fixed string keys in a synchronous key-value store. Any
//! read problem (missing key, unreadable row, corrupted JSON) resolves to the
//! default value; nothing here is ever reported to the user.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use crate::config::Config;
use crate::transcript::Transcript;

pub const SAVED_CHATS_KEY: &str = "saved-chats";
pub const THEME_KEY: &str = "themeColor";

const LIGHT_MODE: &str = "light_mode";
const DARK_MODE: &str = "dark_mode";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

pub struct SqliteStore {
    conn: Connection,
}

fn db_path() -> PathBuf {
    Config::get_config_dir().join("storage.sqlite")
}

impl SqliteStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;
        Ok(SqliteStore { conn })
    }

    pub fn open_default() -> anyhow::Result<Self> {
        Self::open(&db_path())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

/// Process-lifetime store. Stands in when the database cannot be opened.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThemePreference {
    Light,
    #[default]
    Dark,
}

impl ThemePreference {
    /// Only the exact light marker selects the light theme.
    pub fn from_stored(value: Option<&str>) -> Self {
        match value {
            Some(LIGHT_MODE) => ThemePreference::Light,
            _ => ThemePreference::Dark,
        }
    }

    pub fn as_stored(&self) -> &'static str {
        match self {
            ThemePreference::Light => LIGHT_MODE,
            ThemePreference::Dark => DARK_MODE,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ThemePreference::Light => ThemePreference::Dark,
            ThemePreference::Dark => ThemePreference::Light,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub theme: ThemePreference,
    pub transcript: Transcript,
}

pub struct Persistence {
    store: Box<dyn KeyValueStore>,
}

impl Persistence {
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Persistence { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::default()))
    }

    /// Opens the on-disk store, falling back to memory so the chat still works
    /// (without surviving a restart) when the database is unavailable.
    pub fn open_default() -> Self {
        match SqliteStore::open_default() {
            Ok(store) => Self::new(Box::new(store)),
            Err(e) => {
                tracing::warn!("could not open storage, chats will not be saved: {e}");
                Self::in_memory()
            }
        }
    }

    pub fn load(&self) -> Snapshot {
        let theme = match self.store.get(THEME_KEY) {
            Ok(value) => ThemePreference::from_stored(value.as_deref()),
            Err(e) => {
                tracing::warn!(key = THEME_KEY, "failed to read theme: {e}");
                ThemePreference::default()
            }
        };

        let transcript = match self.read_transcript() {
            Ok(transcript) => transcript,
            Err(e) => {
                tracing::warn!(key = SAVED_CHATS_KEY, "discarding unreadable saved chats: {e}");
                Transcript::new()
            }
        };

        tracing::debug!(turns = transcript.len(), ?theme, "loaded saved state");
        Snapshot { theme, transcript }
    }

    /// Writes the transcript. An empty one removes the key instead.
    pub fn save(&mut self, transcript: &Transcript) {
        let result = if transcript.is_empty() {
            self.store.remove(SAVED_CHATS_KEY)
        } else {
            transcript
                .to_json()
                .map_err(StorageError::from)
                .and_then(|json| self.store.set(SAVED_CHATS_KEY, &json))
        };
        match result {
            Ok(()) => tracing::debug!(turns = transcript.len(), "saved chats"),
            Err(e) => tracing::warn!(key = SAVED_CHATS_KEY, "failed to save chats: {e}"),
        }
    }

    pub fn save_theme(&mut self, theme: ThemePreference) {
        if let Err(e) = self.store.set(THEME_KEY, theme.as_stored()) {
            tracing::warn!(key = THEME_KEY, "failed to save theme: {e}");
        }
    }

    /// Forgets the saved chats. The theme preference is kept.
    pub fn clear(&mut self) {
        if let Err(e) = self.store.remove(SAVED_CHATS_KEY) {
            tracing::warn!(key = SAVED_CHATS_KEY, "failed to clear chats: {e}");
        }
    }

    fn read_transcript(&self) -> Result<Transcript, StorageError> {
        match self.store.get(SAVED_CHATS_KEY)? {
            Some(json) => Ok(Transcript::from_json(&json)?),
            None => Ok(Transcript::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup;
    use crate::transcript::ChatTurn;

    fn sample_transcript() -> Transcript {
        [
            ChatTurn::user("Hello"),
            ChatTurn::assistant("Hi **there**", &markup::parse("Hi **there**")),
            ChatTurn::user("again?"),
            ChatTurn::failed("rate limited"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_defaults_when_empty() {
        let persistence = Persistence::in_memory();
        let snapshot = persistence.load();
        assert_eq!(snapshot.theme, ThemePreference::Dark);
        assert!(snapshot.transcript.is_empty());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let mut persistence = Persistence::in_memory();
        let transcript = sample_transcript();
        persistence.save(&transcript);
        assert_eq!(persistence.load().transcript, transcript);
    }

    #[test]
    fn test_saving_empty_transcript_removes_key() {
        let mut store = MemoryStore::default();
        store.set(SAVED_CHATS_KEY, "[]").unwrap();
        let mut persistence = Persistence::new(Box::new(store));

        persistence.save(&Transcript::new());

        assert_eq!(persistence.store.get(SAVED_CHATS_KEY).unwrap(), None);
        assert!(persistence.load().transcript.is_empty());
    }

    #[test]
    fn test_corrupted_chats_resolve_to_empty() {
        let mut store = MemoryStore::default();
        store
            .set(SAVED_CHATS_KEY, "<div class=\"message outgoing\">Hello</div>")
            .unwrap();
        store.set(THEME_KEY, "purple_mode").unwrap();

        let snapshot = Persistence::new(Box::new(store)).load();
        assert!(snapshot.transcript.is_empty());
        assert_eq!(snapshot.theme, ThemePreference::Dark);
    }

    #[test]
    fn test_theme_toggle_twice_restores_stored_value() {
        let mut persistence = Persistence::in_memory();
        persistence.save_theme(ThemePreference::Light);

        let original = persistence.load().theme;
        persistence.save_theme(original.toggled());
        assert_eq!(persistence.load().theme, ThemePreference::Dark);
        let current = persistence.load().theme;
        persistence.save_theme(current.toggled());
        assert_eq!(persistence.load().theme, original);
    }

    #[test]
    fn test_clear_keeps_theme() {
        let mut persistence = Persistence::in_memory();
        persistence.save_theme(ThemePreference::Light);
        persistence.save(&sample_transcript());

        persistence.clear();

        let snapshot = persistence.load();
        assert!(snapshot.transcript.is_empty());
        assert_eq!(snapshot.theme, ThemePreference::Light);
    }

    #[test]
    fn test_sqlite_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.sqlite");

        {
            let mut persistence = Persistence::new(Box::new(SqliteStore::open(&path).unwrap()));
            persistence.save(&sample_transcript());
            persistence.save_theme(ThemePreference::Light);
        }

        let persistence = Persistence::new(Box::new(SqliteStore::open(&path).unwrap()));
        let snapshot = persistence.load();
        assert_eq!(snapshot.transcript, sample_transcript());
        assert_eq!(snapshot.theme, ThemePreference::Light);
    }

    #[test]
    fn test_sqlite_set_overwrites_and_remove_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SqliteStore::open(&dir.path().join("kv.sqlite")).unwrap();

        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "one").unwrap();
        store.set("k", "two").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("two"));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }
}
