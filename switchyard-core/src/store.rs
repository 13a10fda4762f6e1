// ABOUTME: SQLite-backed conversation store: conversations with JSON metadata plus global settings.
// ABOUTME: Metadata updates merge per key so native identifiers and overrides never clobber each other.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use switchyard_agent::conversation::merge_metadata;
use switchyard_agent::{Conversation, ConversationStore, Metadata};

#[derive(Clone)]
pub struct SqliteConversationStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteConversationStore {
    /// Open (or create) the database file, creating parent directories as needed
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let store = Self::init(conn)?;
        tracing::info!(db = %path.display(), "Conversation store initialized");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                working_directory TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|e| anyhow::anyhow!("Database mutex poisoned: {}", e))
    }

    /// Register a new conversation; fails if the id is taken
    pub fn create_conversation(&self, id: &str, working_directory: &Path) -> Result<Conversation> {
        if id.trim().is_empty() {
            anyhow::bail!("Conversation id cannot be empty");
        }
        let db = self.conn()?;
        let inserted = db.execute(
            "INSERT OR IGNORE INTO conversations (id, working_directory, metadata, created_at)
             VALUES (?1, ?2, '{}', ?3)",
            params![
                id,
                working_directory.display().to_string(),
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        if inserted == 0 {
            anyhow::bail!("Conversation '{}' already exists", id);
        }
        tracing::info!(conversation_id = %id, "Created conversation");
        Ok(Conversation::new(id, working_directory))
    }

    /// Delete a conversation and, with it, every native identifier it held
    pub fn delete_conversation(&self, id: &str) -> Result<bool> {
        let db = self.conn()?;
        let deleted = db.execute("DELETE FROM conversations WHERE id = ?1", params![id])?;
        if deleted > 0 {
            tracing::info!(conversation_id = %id, "Deleted conversation");
        }
        Ok(deleted > 0)
    }

    /// All conversations, oldest first
    pub fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            "SELECT id, working_directory, metadata FROM conversations ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut conversations = Vec::new();
        for row in rows {
            let (id, dir, metadata) = row?;
            conversations.push(to_conversation(id, dir, &metadata));
        }
        Ok(conversations)
    }

    fn load(&self, db: &Connection, id: &str) -> Result<Option<Conversation>> {
        let row = db
            .query_row(
                "SELECT working_directory, metadata FROM conversations WHERE id = ?1",
                params![id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(row.map(|(dir, metadata)| to_conversation(id.to_string(), dir, &metadata)))
    }
}

fn to_conversation(id: String, working_directory: String, metadata: &str) -> Conversation {
    let metadata = match serde_json::from_str::<Value>(metadata) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            tracing::warn!(conversation_id = %id, "Conversation metadata is not a JSON object; treating as empty");
            Metadata::new()
        }
    };
    Conversation {
        id,
        working_directory: PathBuf::from(working_directory),
        metadata,
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let db = self.conn()?;
        self.load(&db, id)
    }

    async fn update_metadata(&self, id: &str, partial: Metadata) -> Result<()> {
        let db = self.conn()?;
        let mut conversation = self
            .load(&db, id)?
            .with_context(|| format!("Unknown conversation: {}", id))?;
        merge_metadata(&mut conversation.metadata, partial);
        let encoded = serde_json::to_string(&conversation.metadata)
            .context("Failed to encode conversation metadata")?;
        db.execute(
            "UPDATE conversations SET metadata = ?1 WHERE id = ?2",
            params![encoded, id],
        )?;
        Ok(())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let db = self.conn()?;
        let value = db
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let db = self.conn()?;
        db.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }
}
