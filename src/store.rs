//! Preference Store
//!
//! Single-key get/set/delete of user and chat preferences. The SQLite
//! backend keeps one table per preference kind; the in-memory backend is
//! used by tests and as a fallback.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::error::Result;

/// Theme used for HTML output when the user has not picked one
pub const DEFAULT_THEME: &str = "base16/bright";

/// Per-user override inside a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchRequest {
    Watch,
    Ignore,
}

impl WatchRequest {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Watch => "watch",
            Self::Ignore => "ignore",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "watch" => Some(Self::Watch),
            "ignore" => Some(Self::Ignore),
            _ => None,
        }
    }
}

/// Keys of the preference store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrefKey {
    /// user id -> theme name
    UserTheme(i64),
    /// chat id -> default syntax ext
    GroupSyntax(i64),
    /// chat id -> ignore mode flag
    GroupIgnoreMode(i64),
    /// (chat id, user id) -> "watch" | "ignore"
    WatchRequest { chat_id: i64, user_id: i64 },
}

impl PrefKey {
    /// Composite string form of the key, as stored
    pub fn key_string(&self) -> String {
        match self {
            Self::UserTheme(id) | Self::GroupSyntax(id) | Self::GroupIgnoreMode(id) => id.to_string(),
            Self::WatchRequest { chat_id, user_id } => format!("{}:{}", chat_id, user_id),
        }
    }

    fn table(&self) -> &'static str {
        match self {
            Self::UserTheme(_) => "user_theme",
            Self::GroupSyntax(_) => "group_syntax",
            Self::GroupIgnoreMode(_) => "group_in_ignore_mode",
            Self::WatchRequest { .. } => "group_user_current_watchme_request",
        }
    }
}

/// Key-value store with single-key atomic operations
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &PrefKey) -> Result<Option<String>>;
    fn set(&self, key: &PrefKey, value: &str) -> Result<()>;
    fn delete(&self, key: &PrefKey) -> Result<()>;
}

/// Typed accessors over any [`PreferenceStore`]
pub struct Preferences<'a> {
    store: &'a dyn PreferenceStore,
}

impl<'a> Preferences<'a> {
    pub fn new(store: &'a dyn PreferenceStore) -> Self {
        Self { store }
    }

    pub fn theme(&self, user_id: i64) -> Result<String> {
        Ok(self
            .store
            .get(&PrefKey::UserTheme(user_id))?
            .unwrap_or_else(|| DEFAULT_THEME.to_string()))
    }

    pub fn set_theme(&self, user_id: i64, theme: &str) -> Result<()> {
        self.store.set(&PrefKey::UserTheme(user_id), theme)
    }

    pub fn group_syntax(&self, chat_id: i64) -> Result<Option<String>> {
        self.store.get(&PrefKey::GroupSyntax(chat_id))
    }

    /// Set the chat default; an empty ext deletes it
    pub fn set_group_syntax(&self, chat_id: i64, ext: &str) -> Result<()> {
        if ext.is_empty() {
            self.store.delete(&PrefKey::GroupSyntax(chat_id))
        } else {
            self.store.set(&PrefKey::GroupSyntax(chat_id), ext)
        }
    }

    pub fn ignore_mode(&self, chat_id: i64) -> Result<bool> {
        Ok(self
            .store
            .get(&PrefKey::GroupIgnoreMode(chat_id))?
            .map(|v| v == "1")
            .unwrap_or(false))
    }

    pub fn set_ignore_mode(&self, chat_id: i64, ignore: bool) -> Result<()> {
        self.store
            .set(&PrefKey::GroupIgnoreMode(chat_id), if ignore { "1" } else { "0" })
    }

    pub fn watch_request(&self, chat_id: i64, user_id: i64) -> Result<Option<WatchRequest>> {
        Ok(self
            .store
            .get(&PrefKey::WatchRequest { chat_id, user_id })?
            .and_then(|v| WatchRequest::parse(&v)))
    }

    pub fn set_watch_request(&self, chat_id: i64, user_id: i64, request: WatchRequest) -> Result<()> {
        self.store
            .set(&PrefKey::WatchRequest { chat_id, user_id }, request.as_str())
    }

    /// Whether snippets from `user_id` in `chat_id` should be handled.
    ///
    /// In ignore mode only users who asked to be watched are served;
    /// otherwise everyone except users who asked to be ignored.
    pub fn should_watch(&self, chat_id: i64, user_id: i64) -> Result<bool> {
        let request = self.watch_request(chat_id, user_id)?;
        if self.ignore_mode(chat_id)? {
            Ok(request == Some(WatchRequest::Watch))
        } else {
            Ok(request != Some(WatchRequest::Ignore))
        }
    }
}

// ============ SQLite ============

/// SQLite-backed store
pub struct SqlitePreferenceStore {
    conn: Mutex<Connection>,
}

impl SqlitePreferenceStore {
    /// Open or create the database
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| crate::error::BotError::Store(format!("{}: {}", parent.display(), e)))?;
        }

        let conn = Connection::open(path)?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;

        info!("Preference store opened: {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS user_theme (
                key INTEGER PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS group_syntax (
                key INTEGER PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS group_in_ignore_mode (
                key INTEGER PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS group_user_current_watchme_request (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

impl PreferenceStore for SqlitePreferenceStore {
    fn get(&self, key: &PrefKey) -> Result<Option<String>> {
        let sql = format!("SELECT value FROM {} WHERE key = ?1", key.table());
        let conn = self.conn.lock();
        let value = match key {
            PrefKey::WatchRequest { .. } => conn
                .query_row(&sql, params![key.key_string()], |row| row.get(0))
                .optional()?,
            PrefKey::UserTheme(id) | PrefKey::GroupSyntax(id) | PrefKey::GroupIgnoreMode(id) => conn
                .query_row(&sql, params![id], |row| row.get(0))
                .optional()?,
        };
        Ok(value)
    }

    fn set(&self, key: &PrefKey, value: &str) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            key.table()
        );
        let conn = self.conn.lock();
        match key {
            PrefKey::WatchRequest { .. } => conn.execute(&sql, params![key.key_string(), value])?,
            PrefKey::UserTheme(id) | PrefKey::GroupSyntax(id) | PrefKey::GroupIgnoreMode(id) => {
                conn.execute(&sql, params![id, value])?
            }
        };
        debug!(table = key.table(), key = %key.key_string(), value, "preference set");
        Ok(())
    }

    fn delete(&self, key: &PrefKey) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE key = ?1", key.table());
        let conn = self.conn.lock();
        match key {
            PrefKey::WatchRequest { .. } => conn.execute(&sql, params![key.key_string()])?,
            PrefKey::UserTheme(id) | PrefKey::GroupSyntax(id) | PrefKey::GroupIgnoreMode(id) => {
                conn.execute(&sql, params![id])?
            }
        };
        debug!(table = key.table(), key = %key.key_string(), "preference deleted");
        Ok(())
    }
}

// ============ In-memory ============

#[derive(Default)]
pub struct MemoryPreferenceStore {
    entries: Mutex<HashMap<PrefKey, String>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &PrefKey) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &PrefKey, value: &str) -> Result<()> {
        self.entries.lock().insert(*key, value.to_string());
        Ok(())
    }

    fn delete(&self, key: &PrefKey) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_store(store: &dyn PreferenceStore) {
        let prefs = Preferences::new(store);

        assert_eq!(prefs.theme(5).unwrap(), DEFAULT_THEME);
        prefs.set_theme(5, "zenburn").unwrap();
        prefs.set_theme(5, "github").unwrap();
        assert_eq!(prefs.theme(5).unwrap(), "github");

        assert_eq!(prefs.group_syntax(-100).unwrap(), None);
        prefs.set_group_syntax(-100, "py").unwrap();
        assert_eq!(prefs.group_syntax(-100).unwrap().as_deref(), Some("py"));
        prefs.set_group_syntax(-100, "").unwrap();
        assert_eq!(prefs.group_syntax(-100).unwrap(), None);

        assert!(!prefs.ignore_mode(-100).unwrap());
        prefs.set_ignore_mode(-100, true).unwrap();
        assert!(prefs.ignore_mode(-100).unwrap());

        prefs.set_watch_request(-100, 5, WatchRequest::Watch).unwrap();
        assert_eq!(prefs.watch_request(-100, 5).unwrap(), Some(WatchRequest::Watch));
        assert_eq!(prefs.watch_request(-100, 6).unwrap(), None);
    }

    #[test]
    fn test_memory_store() {
        check_store(&MemoryPreferenceStore::new());
    }

    #[test]
    fn test_sqlite_store() {
        check_store(&SqlitePreferenceStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_sqlite_store_persists() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("ccb.sqlite");
        {
            let store = SqlitePreferenceStore::open(&path).unwrap();
            Preferences::new(&store).set_theme(9, "molokai").unwrap();
        }
        let store = SqlitePreferenceStore::open(&path).unwrap();
        assert_eq!(Preferences::new(&store).theme(9).unwrap(), "molokai");
    }

    #[test]
    fn test_should_watch_rules() {
        let store = MemoryPreferenceStore::new();
        let prefs = Preferences::new(&store);

        // Watch mode: everyone unless they opted out
        assert!(prefs.should_watch(-1, 1).unwrap());
        prefs.set_watch_request(-1, 1, WatchRequest::Ignore).unwrap();
        assert!(!prefs.should_watch(-1, 1).unwrap());

        // Ignore mode: nobody unless they opted in
        prefs.set_ignore_mode(-1, true).unwrap();
        assert!(!prefs.should_watch(-1, 2).unwrap());
        prefs.set_watch_request(-1, 2, WatchRequest::Watch).unwrap();
        assert!(prefs.should_watch(-1, 2).unwrap());
    }

    #[test]
    fn test_composite_key_format() {
        let key = PrefKey::WatchRequest { chat_id: -100123, user_id: 42 };
        assert_eq!(key.key_string(), "-100123:42");
    }
}
