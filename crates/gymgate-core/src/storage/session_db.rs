//! SQLite-backed session persistence.
//!
//! One flat key-value record per session, JSON-encoded under
//! `session:<id>`. A snapshot is written after every transition so a
//! process restart can pick the cycle back up; see
//! `SessionManager::resume` for how a past-due armed timer is replayed.

use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, StorageError};
use crate::session::{SessionId, VerificationSession};

/// SQLite database for persisted session state.
pub struct SessionDb {
    conn: Connection,
}

const SESSION_KEY_PREFIX: &str = "session:";

fn session_key(id: SessionId) -> String {
    format!("{SESSION_KEY_PREFIX}{id}")
}

impl SessionDb {
    /// Open the database at `~/.config/gymgate/gymgate.db`, creating
    /// file and schema as needed.
    pub fn open() -> Result<Self, CoreError> {
        let path = super::data_dir()?.join("gymgate.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: PathBuf::from(path),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|source| StorageError::OpenFailed {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    pub fn kv_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn kv_delete(&self, key: &str) -> Result<(), StorageError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn kv_with_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM kv WHERE key LIKE ?1 || '%' ORDER BY key")?;
        let rows = stmt.query_map(params![prefix], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Persist a session snapshot, overwriting any previous one.
    pub fn save_session(&self, session: &VerificationSession) -> Result<(), CoreError> {
        let json = serde_json::to_string(session)?;
        self.kv_set(&session_key(session.id()), &json)?;
        Ok(())
    }

    pub fn load_session(&self, id: SessionId) -> Result<Option<VerificationSession>, CoreError> {
        let key = session_key(id);
        match self.kv_get(&key)? {
            Some(json) => {
                let session = serde_json::from_str(&json).map_err(|e| {
                    StorageError::CorruptRecord {
                        key,
                        message: e.to_string(),
                    }
                })?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    pub fn load_all_sessions(&self) -> Result<Vec<VerificationSession>, CoreError> {
        let mut sessions = Vec::new();
        for (key, json) in self.kv_with_prefix(SESSION_KEY_PREFIX)? {
            let session =
                serde_json::from_str(&json).map_err(|e| StorageError::CorruptRecord {
                    key,
                    message: e.to_string(),
                })?;
            sessions.push(session);
        }
        Ok(sessions)
    }

    pub fn delete_session(&self, id: SessionId) -> Result<(), StorageError> {
        self.kv_delete(&session_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::GymSettings;

    #[test]
    fn kv_roundtrip_and_overwrite() {
        let db = SessionDb::open_memory().unwrap();
        assert_eq!(db.kv_get("k").unwrap(), None);
        db.kv_set("k", "v1").unwrap();
        assert_eq!(db.kv_get("k").unwrap().as_deref(), Some("v1"));
        db.kv_set("k", "v2").unwrap();
        assert_eq!(db.kv_get("k").unwrap().as_deref(), Some("v2"));
        db.kv_delete("k").unwrap();
        assert_eq!(db.kv_get("k").unwrap(), None);
    }

    #[test]
    fn session_save_load_delete() {
        let db = SessionDb::open_memory().unwrap();
        let mut session =
            VerificationSession::new(SessionId::new(), GymSettings::default());
        session.start(chrono::Utc::now()).unwrap();

        db.save_session(&session).unwrap();
        let loaded = db.load_session(session.id()).unwrap().unwrap();
        assert_eq!(loaded.snapshot(), session.snapshot());

        assert_eq!(db.load_all_sessions().unwrap().len(), 1);
        db.delete_session(session.id()).unwrap();
        assert!(db.load_session(session.id()).unwrap().is_none());
    }

    #[test]
    fn corrupt_record_is_reported_not_swallowed() {
        let db = SessionDb::open_memory().unwrap();
        let id = SessionId::new();
        db.kv_set(&format!("session:{id}"), "{ not json").unwrap();
        assert!(db.load_session(id).is_err());
    }
}
