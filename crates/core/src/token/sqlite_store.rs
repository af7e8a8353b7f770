//! SQLite-backed token store implementation.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};

use super::store::TokenStore;
use super::types::{AuthContext, TokenError};

/// SQLite-backed token store. The context is a singleton, kept as a single
/// JSON row so schema changes never need a migration.
pub struct SqliteTokenStore {
    conn: Mutex<Connection>,
}

impl SqliteTokenStore {
    /// Create a new SQLite token store, creating the database file and
    /// table if needed.
    pub fn new(path: &Path) -> Result<Self, TokenError> {
        let conn = Connection::open(path).map_err(|e| TokenError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite token store (useful for testing).
    pub fn in_memory() -> Result<Self, TokenError> {
        let conn = Connection::open_in_memory().map_err(|e| TokenError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), TokenError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS auth_context (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                context TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| TokenError::Database(e.to_string()))?;
        Ok(())
    }
}

impl TokenStore for SqliteTokenStore {
    fn load(&self) -> Result<Option<AuthContext>, TokenError> {
        let conn = self.conn.lock().unwrap();

        let result = conn.query_row(
            "SELECT context FROM auth_context WHERE id = 1",
            [],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| TokenError::Database(e.to_string())),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(TokenError::Database(e.to_string())),
        }
    }

    fn save(&self, context: &AuthContext) -> Result<(), TokenError> {
        let conn = self.conn.lock().unwrap();

        let json =
            serde_json::to_string(context).map_err(|e| TokenError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO auth_context (id, context, updated_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET context = ?1, updated_at = ?2",
            params![json, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(|e| TokenError::Database(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_load_empty() {
        let store = SqliteTokenStore::in_memory().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load() {
        let store = SqliteTokenStore::in_memory().unwrap();
        let ctx = AuthContext {
            proof_token: Some("proof".to_string()),
            visitor_id: Some("visitor".to_string()),
            oauth_token: None,
            last_verified_at: Some(Utc::now()),
            verified_valid: true,
            source: "test".to_string(),
        };
        store.save(&ctx).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.proof_token, ctx.proof_token);
        assert_eq!(loaded.visitor_id, ctx.visitor_id);
        assert!(loaded.verified_valid);
    }

    #[test]
    fn test_save_replaces_previous() {
        let store = SqliteTokenStore::in_memory().unwrap();
        let first = AuthContext {
            proof_token: Some("first".to_string()),
            ..Default::default()
        };
        let second = AuthContext {
            proof_token: Some("second".to_string()),
            ..Default::default()
        };
        store.save(&first).unwrap();
        store.save(&second).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.proof_token.as_deref(), Some("second"));
    }
}
