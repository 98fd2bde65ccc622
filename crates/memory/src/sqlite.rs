//! SQLite memory store.
//!
//! Uses a single SQLite database file with six tables:
//! - `metadata`, `user_info`, `settings` — key/value, last write wins
//! - `facts` — topic → content
//! - `procedures` — name → ordered steps (JSON array)
//! - `conversations` — append-only log keyed by an autoincrement id
//!
//! Every public operation is one statement, so each write commits on its
//! own. The pool holds exactly one connection, which serializes writers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keepsake_core::error::StoreError;
use keepsake_core::memory::{
    FIRST_INTERACTION, INTERACTION_COUNT, MemorySnapshot, MemoryStore,
};
use keepsake_core::message::{ConversationEntry, Role};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// Entries returned by `export_all` unless overridden.
const DEFAULT_EXPORT_LIMIT: usize = 20;

/// The key/value tables. Names are fixed, so they are safe to splice into SQL.
#[derive(Debug, Clone, Copy)]
enum KvTable {
    Metadata,
    UserInfo,
    Settings,
}

impl KvTable {
    fn name(self) -> &'static str {
        match self {
            KvTable::Metadata => "metadata",
            KvTable::UserInfo => "user_info",
            KvTable::Settings => "settings",
        }
    }
}

/// A SQLite-backed [`MemoryStore`].
pub struct SqliteStore {
    pool: SqlitePool,
    export_limit: usize,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    ///
    /// The parent directory must already exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let store = Self::connect(options).await?;
        info!("SQLite memory store opened at {}", path.display());
        Ok(store)
    }

    /// Open an ephemeral in-process database (useful for tests).
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::Unavailable(format!("Invalid SQLite URL: {e}")))?;
        Self::connect(options).await
    }

    /// Number of conversation entries included in `export_all`.
    pub fn with_export_limit(mut self, limit: usize) -> Self {
        self.export_limit = limit;
        self
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, StoreError> {
        // One long-lived connection: serializes writers and keeps an
        // in-memory database alive for the lifetime of the pool.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to open SQLite: {e}")))?;

        let store = Self {
            pool,
            export_limit: DEFAULT_EXPORT_LIMIT,
        };
        store.run_migrations().await?;
        store.seed_defaults().await?;
        Ok(store)
    }

    /// Create all tables if they do not exist yet.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        let statements = [
            (
                "metadata",
                r#"
                CREATE TABLE IF NOT EXISTS metadata (
                    key        TEXT PRIMARY KEY,
                    value      TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )
                "#,
            ),
            (
                "user_info",
                r#"
                CREATE TABLE IF NOT EXISTS user_info (
                    key        TEXT PRIMARY KEY,
                    value      TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )
                "#,
            ),
            (
                "settings",
                r#"
                CREATE TABLE IF NOT EXISTS settings (
                    key        TEXT PRIMARY KEY,
                    value      TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )
                "#,
            ),
            (
                "facts",
                r#"
                CREATE TABLE IF NOT EXISTS facts (
                    topic      TEXT PRIMARY KEY,
                    content    TEXT NOT NULL,
                    learned_at TEXT NOT NULL
                )
                "#,
            ),
            (
                "procedures",
                r#"
                CREATE TABLE IF NOT EXISTS procedures (
                    name       TEXT PRIMARY KEY,
                    steps      TEXT NOT NULL DEFAULT '[]',
                    learned_at TEXT NOT NULL
                )
                "#,
            ),
            (
                "conversations",
                r#"
                CREATE TABLE IF NOT EXISTS conversations (
                    id        INTEGER PRIMARY KEY AUTOINCREMENT,
                    timestamp TEXT NOT NULL,
                    role      TEXT NOT NULL,
                    message   TEXT NOT NULL
                )
                "#,
            ),
        ];

        for (table, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Unavailable(format!("{table} table: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Seed the counters the rest of the system expects to exist.
    async fn seed_defaults(&self) -> Result<(), StoreError> {
        let now = Self::now();
        for (key, value) in [(INTERACTION_COUNT, "0"), (FIRST_INTERACTION, now.as_str())] {
            sqlx::query(
                "INSERT OR IGNORE INTO metadata (key, value, updated_at) VALUES (?1, ?2, ?3)",
            )
            .bind(key)
            .bind(value)
            .bind(&now)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("seeding {key}: {e}")))?;
        }
        Ok(())
    }

    fn now() -> String {
        Utc::now().to_rfc3339()
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.pool.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn parse_timestamp(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    /// Decode a stored step list. A value that is not a JSON array is read
    /// as a single step.
    fn parse_steps(raw: &str) -> Vec<String> {
        serde_json::from_str(raw).unwrap_or_else(|_| vec![raw.to_string()])
    }

    fn row_to_entry(row: &SqliteRow) -> Result<ConversationEntry, StoreError> {
        let id: i64 = row
            .try_get("id")
            .map_err(|e| StoreError::ReadFailed(format!("id column: {e}")))?;
        let timestamp: String = row
            .try_get("timestamp")
            .map_err(|e| StoreError::ReadFailed(format!("timestamp column: {e}")))?;
        let role: String = row
            .try_get("role")
            .map_err(|e| StoreError::ReadFailed(format!("role column: {e}")))?;
        let text: String = row
            .try_get("message")
            .map_err(|e| StoreError::ReadFailed(format!("message column: {e}")))?;

        Ok(ConversationEntry {
            id,
            timestamp: Self::parse_timestamp(&timestamp),
            role: Role::parse(&role),
            text,
        })
    }

    async fn kv_get(&self, table: KvTable, key: &str) -> Result<Option<String>, StoreError> {
        self.ensure_open()?;
        let sql = format!("SELECT value FROM {} WHERE key = ?1", table.name());
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::ReadFailed(format!("{} lookup: {e}", table.name())))?;

        row.map(|r| {
            r.try_get::<String, _>("value")
                .map_err(|e| StoreError::ReadFailed(format!("value column: {e}")))
        })
        .transpose()
    }

    async fn kv_set(&self, table: KvTable, key: &str, value: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        let sql = format!(
            r#"
            INSERT INTO {} (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            table.name()
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(value)
            .bind(Self::now())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::WriteFailed(format!("{} upsert: {e}", table.name())))?;

        debug!(table = table.name(), key, "Stored value");
        Ok(())
    }

    async fn kv_all(&self, table: KvTable) -> Result<BTreeMap<String, String>, StoreError> {
        self.ensure_open()?;
        let sql = format!("SELECT key, value FROM {}", table.name());
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::ReadFailed(format!("{} scan: {e}", table.name())))?;

        rows.iter()
            .map(|r| {
                let key: String = r
                    .try_get("key")
                    .map_err(|e| StoreError::ReadFailed(format!("key column: {e}")))?;
                let value: String = r
                    .try_get("value")
                    .map_err(|e| StoreError::ReadFailed(format!("value column: {e}")))?;
                Ok((key, value))
            })
            .collect()
    }
}

#[async_trait]
impl MemoryStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.kv_get(KvTable::Metadata, key).await
    }

    async fn set_metadata(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.kv_set(KvTable::Metadata, key, value).await
    }

    async fn increment_interaction_count(&self) -> Result<u64, StoreError> {
        self.ensure_open()?;
        // Read-modify-write in a single statement.
        let row = sqlx::query(
            r#"
            INSERT INTO metadata (key, value, updated_at) VALUES (?1, '1', ?2)
            ON CONFLICT(key) DO UPDATE SET
                value = CAST(metadata.value AS INTEGER) + 1,
                updated_at = excluded.updated_at
            RETURNING CAST(value AS INTEGER) AS count
            "#,
        )
        .bind(INTERACTION_COUNT)
        .bind(Self::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::WriteFailed(format!("interaction_count increment: {e}")))?;

        let count: i64 = row
            .try_get("count")
            .map_err(|e| StoreError::ReadFailed(format!("count column: {e}")))?;
        Ok(count.max(0) as u64)
    }

    async fn get_user_attribute(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.kv_get(KvTable::UserInfo, key).await
    }

    async fn user_attributes(&self) -> Result<BTreeMap<String, String>, StoreError> {
        self.kv_all(KvTable::UserInfo).await
    }

    async fn set_user_attribute(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.kv_set(KvTable::UserInfo, key, value).await
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.kv_get(KvTable::Settings, key).await
    }

    async fn settings(&self) -> Result<BTreeMap<String, String>, StoreError> {
        self.kv_all(KvTable::Settings).await
    }

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.kv_set(KvTable::Settings, key, value).await
    }

    async fn learn_fact(&self, topic: &str, content: &str) -> Result<String, StoreError> {
        self.ensure_open()?;
        sqlx::query(
            r#"
            INSERT INTO facts (topic, content, learned_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(topic) DO UPDATE SET
                content = excluded.content,
                learned_at = excluded.learned_at
            "#,
        )
        .bind(topic)
        .bind(content)
        .bind(Self::now())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::WriteFailed(format!("facts upsert: {e}")))?;

        debug!(topic, "Learned fact");
        Ok(format!("Got it! I'll remember that about {topic}."))
    }

    async fn get_fact(&self, topic: &str) -> Result<Option<String>, StoreError> {
        self.ensure_open()?;
        let row = sqlx::query("SELECT content FROM facts WHERE topic = ?1")
            .bind(topic)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::ReadFailed(format!("fact lookup: {e}")))?;

        row.map(|r| {
            r.try_get::<String, _>("content")
                .map_err(|e| StoreError::ReadFailed(format!("content column: {e}")))
        })
        .transpose()
    }

    async fn list_facts(&self) -> Result<BTreeMap<String, String>, StoreError> {
        self.ensure_open()?;
        let rows = sqlx::query("SELECT topic, content FROM facts")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::ReadFailed(format!("facts scan: {e}")))?;

        rows.iter()
            .map(|r| {
                let topic: String = r
                    .try_get("topic")
                    .map_err(|e| StoreError::ReadFailed(format!("topic column: {e}")))?;
                let content: String = r
                    .try_get("content")
                    .map_err(|e| StoreError::ReadFailed(format!("content column: {e}")))?;
                Ok((topic, content))
            })
            .collect()
    }

    async fn count_facts(&self) -> Result<usize, StoreError> {
        self.ensure_open()?;
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM facts")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::ReadFailed(format!("COUNT: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| StoreError::ReadFailed(format!("cnt column: {e}")))?;
        Ok(cnt as usize)
    }

    async fn learn_procedure(&self, name: &str, steps: &[String]) -> Result<String, StoreError> {
        self.ensure_open()?;
        let steps_json = serde_json::to_string(steps)
            .map_err(|e| StoreError::WriteFailed(format!("steps serialization: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO procedures (name, steps, learned_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET
                steps = excluded.steps,
                learned_at = excluded.learned_at
            "#,
        )
        .bind(name)
        .bind(&steps_json)
        .bind(Self::now())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::WriteFailed(format!("procedures upsert: {e}")))?;

        debug!(name, steps = steps.len(), "Learned procedure");
        Ok(format!("Yay! I learned how to {name}!"))
    }

    async fn get_procedure(&self, name: &str) -> Result<Option<Vec<String>>, StoreError> {
        self.ensure_open()?;
        let row = sqlx::query("SELECT steps FROM procedures WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::ReadFailed(format!("procedure lookup: {e}")))?;

        match row {
            Some(r) => {
                let raw: String = r
                    .try_get("steps")
                    .map_err(|e| StoreError::ReadFailed(format!("steps column: {e}")))?;
                Ok(Some(Self::parse_steps(&raw)))
            }
            None => Ok(None),
        }
    }

    async fn list_procedure_names(&self) -> Result<Vec<String>, StoreError> {
        self.ensure_open()?;
        let rows = sqlx::query("SELECT name FROM procedures ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::ReadFailed(format!("procedure names: {e}")))?;

        rows.iter()
            .map(|r| {
                r.try_get::<String, _>("name")
                    .map_err(|e| StoreError::ReadFailed(format!("name column: {e}")))
            })
            .collect()
    }

    async fn list_procedures(&self) -> Result<BTreeMap<String, Vec<String>>, StoreError> {
        self.ensure_open()?;
        let rows = sqlx::query("SELECT name, steps FROM procedures")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::ReadFailed(format!("procedures scan: {e}")))?;

        rows.iter()
            .map(|r| {
                let name: String = r
                    .try_get("name")
                    .map_err(|e| StoreError::ReadFailed(format!("name column: {e}")))?;
                let raw: String = r
                    .try_get("steps")
                    .map_err(|e| StoreError::ReadFailed(format!("steps column: {e}")))?;
                Ok((name, Self::parse_steps(&raw)))
            })
            .collect()
    }

    async fn append_conversation(&self, role: Role, text: &str) -> Result<i64, StoreError> {
        self.ensure_open()?;
        let result = sqlx::query(
            "INSERT INTO conversations (timestamp, role, message) VALUES (?1, ?2, ?3)",
        )
        .bind(Self::now())
        .bind(role.as_str())
        .bind(text)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::WriteFailed(format!("conversation append: {e}")))?;

        let id = result.last_insert_rowid();
        debug!(id, role = %role, "Appended conversation entry");
        Ok(id)
    }

    async fn recent_conversation(
        &self,
        limit: usize,
    ) -> Result<Vec<ConversationEntry>, StoreError> {
        self.ensure_open()?;
        let rows = sqlx::query(
            "SELECT id, timestamp, role, message FROM conversations ORDER BY id DESC LIMIT ?1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::ReadFailed(format!("recent conversation: {e}")))?;

        let mut entries = rows
            .iter()
            .map(Self::row_to_entry)
            .collect::<Result<Vec<_>, _>>()?;
        entries.reverse();
        Ok(entries)
    }

    async fn prune_conversation(&self, keep_last: usize) -> Result<u64, StoreError> {
        self.ensure_open()?;
        let result = sqlx::query(
            r#"
            DELETE FROM conversations
            WHERE id NOT IN (
                SELECT id FROM conversations ORDER BY id DESC LIMIT ?1
            )
            "#,
        )
        .bind(keep_last as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::WriteFailed(format!("conversation prune: {e}")))?;

        let removed = result.rows_affected();
        if removed > 0 {
            debug!(removed, keep_last, "Pruned conversation log");
        }
        Ok(removed)
    }

    async fn export_all(&self) -> Result<MemorySnapshot, StoreError> {
        Ok(MemorySnapshot {
            metadata: self.kv_all(KvTable::Metadata).await?,
            user_attributes: self.user_attributes().await?,
            settings: self.settings().await?,
            facts: self.list_facts().await?,
            procedures: self.list_procedures().await?,
            recent_conversation: self.recent_conversation(self.export_limit).await?,
        })
    }

    async fn close(&self) {
        if !self.pool.is_closed() {
            self.pool.close().await;
            info!("SQLite memory store closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn fresh_store_seeds_metadata() {
        let db = test_store().await;
        assert_eq!(
            db.get_metadata(INTERACTION_COUNT).await.unwrap().as_deref(),
            Some("0")
        );
        let first = db.get_metadata(FIRST_INTERACTION).await.unwrap().unwrap();
        assert!(DateTime::parse_from_rfc3339(&first).is_ok());
    }

    #[tokio::test]
    async fn missing_keys_are_absent_not_errors() {
        let db = test_store().await;
        assert!(db.get_metadata("nope").await.unwrap().is_none());
        assert!(db.get_user_attribute("nope").await.unwrap().is_none());
        assert!(db.get_setting("nope").await.unwrap().is_none());
        assert!(db.get_fact("nope").await.unwrap().is_none());
        assert!(db.get_procedure("nope").await.unwrap().is_none());
        assert!(db.user_attributes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn metadata_last_write_wins() {
        let db = test_store().await;
        db.set_metadata("mood", "sleepy").await.unwrap();
        db.set_metadata("mood", "cheerful").await.unwrap();
        assert_eq!(
            db.get_metadata("mood").await.unwrap().as_deref(),
            Some("cheerful")
        );
    }

    #[tokio::test]
    async fn increment_counts_from_zero() {
        let db = test_store().await;
        for expected in 1..=5 {
            assert_eq!(db.increment_interaction_count().await.unwrap(), expected);
        }
        assert_eq!(
            db.get_metadata(INTERACTION_COUNT).await.unwrap().as_deref(),
            Some("5")
        );
    }

    #[tokio::test]
    async fn increment_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");

        let db = SqliteStore::open(&path).await.unwrap();
        for _ in 0..3 {
            db.increment_interaction_count().await.unwrap();
        }
        let first = db.get_metadata(FIRST_INTERACTION).await.unwrap();
        db.close().await;

        let reopened = SqliteStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.get_metadata(INTERACTION_COUNT).await.unwrap().as_deref(),
            Some("3")
        );
        // Seeding must not overwrite an existing first_interaction.
        assert_eq!(reopened.get_metadata(FIRST_INTERACTION).await.unwrap(), first);
    }

    #[tokio::test]
    async fn user_attributes_and_settings_are_separate() {
        let db = test_store().await;
        db.set_user_attribute("name", "Sam").await.unwrap();
        db.set_user_attribute("name", "Samira").await.unwrap();
        db.set_setting("name", "persona-v2").await.unwrap();

        let attrs = db.user_attributes().await.unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs["name"], "Samira");
        assert_eq!(
            db.get_setting("name").await.unwrap().as_deref(),
            Some("persona-v2")
        );
        assert_eq!(db.settings().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn relearning_a_fact_overwrites() {
        let db = test_store().await;
        let msg = db.learn_fact("color", "blue").await.unwrap();
        assert!(msg.contains("color"));
        db.learn_fact("color", "green").await.unwrap();
        db.learn_fact("pet", "cat").await.unwrap();

        assert_eq!(db.count_facts().await.unwrap(), 2);
        assert_eq!(db.get_fact("color").await.unwrap().as_deref(), Some("green"));
        let facts = db.list_facts().await.unwrap();
        assert_eq!(facts.keys().collect::<Vec<_>>(), vec!["color", "pet"]);
    }

    #[tokio::test]
    async fn relearning_a_procedure_replaces_all_steps() {
        let db = test_store().await;
        let steps = vec!["boil water".to_string(), "add leaves".into(), "wait".into()];
        let msg = db.learn_procedure("make tea", &steps).await.unwrap();
        assert!(msg.contains("make tea"));

        db.learn_procedure("make tea", &["use a teabag".to_string()])
            .await
            .unwrap();
        assert_eq!(
            db.get_procedure("make tea").await.unwrap(),
            Some(vec!["use a teabag".to_string()])
        );
        assert_eq!(db.list_procedure_names().await.unwrap(), vec!["make tea"]);
    }

    #[tokio::test]
    async fn procedure_names_are_lexical_and_stable() {
        let db = test_store().await;
        for name in ["water plants", "feed cat", "lock door"] {
            db.learn_procedure(name, &["do it".to_string()]).await.unwrap();
        }
        let first = db.list_procedure_names().await.unwrap();
        assert_eq!(first, vec!["feed cat", "lock door", "water plants"]);
        assert_eq!(db.list_procedure_names().await.unwrap(), first);
    }

    #[tokio::test]
    async fn step_order_is_preserved() {
        let db = test_store().await;
        let steps: Vec<String> = (1..=6).rev().map(|i| format!("step {i}")).collect();
        db.learn_procedure("countdown", &steps).await.unwrap();
        assert_eq!(db.get_procedure("countdown").await.unwrap(), Some(steps));
    }

    #[tokio::test]
    async fn recent_conversation_is_oldest_first() {
        let db = test_store().await;
        db.append_conversation(Role::User, "hi").await.unwrap();
        db.append_conversation(Role::Assistant, "hello!").await.unwrap();
        db.append_conversation(Role::User, "how are you?").await.unwrap();

        let recent = db.recent_conversation(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "hello!");
        assert_eq!(recent[0].role, Role::Assistant);
        assert_eq!(recent[1].text, "how are you?");
        assert!(recent[0].id < recent[1].id);

        assert_eq!(db.recent_conversation(100).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn prune_keeps_most_recent_by_sequence() {
        let db = test_store().await;
        for i in 0..25 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            db.append_conversation(role, &format!("m{i}")).await.unwrap();
        }

        assert_eq!(db.prune_conversation(20).await.unwrap(), 5);
        let kept = db.recent_conversation(100).await.unwrap();
        assert_eq!(kept.len(), 20);
        let texts: Vec<String> = kept.iter().map(|e| e.text.clone()).collect();
        let expected: Vec<String> = (5..25).map(|i| format!("m{i}")).collect();
        assert_eq!(texts, expected);

        // Idempotent.
        assert_eq!(db.prune_conversation(20).await.unwrap(), 0);
        assert_eq!(db.recent_conversation(100).await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn sequence_ids_keep_increasing_after_prune() {
        let db = test_store().await;
        let mut last = 0;
        for i in 0..5 {
            last = db.append_conversation(Role::User, &format!("m{i}")).await.unwrap();
        }
        db.prune_conversation(0).await.unwrap();
        assert!(db.recent_conversation(10).await.unwrap().is_empty());

        let next = db.append_conversation(Role::User, "again").await.unwrap();
        assert!(next > last);
    }

    #[tokio::test]
    async fn export_covers_every_table() {
        let db = test_store().await.with_export_limit(2);
        db.set_user_attribute("name", "Sam").await.unwrap();
        db.set_setting("theme", "dark").await.unwrap();
        db.learn_fact("color", "blue").await.unwrap();
        db.learn_procedure("wave", &["raise hand".to_string()]).await.unwrap();
        for text in ["a", "b", "c"] {
            db.append_conversation(Role::User, text).await.unwrap();
        }

        let snapshot = db.export_all().await.unwrap();
        assert_eq!(snapshot.metadata[INTERACTION_COUNT], "0");
        assert!(snapshot.metadata.contains_key(FIRST_INTERACTION));
        assert_eq!(snapshot.user_attributes["name"], "Sam");
        assert_eq!(snapshot.settings["theme"], "dark");
        assert_eq!(snapshot.facts["color"], "blue");
        assert_eq!(snapshot.procedures["wave"], vec!["raise hand"]);
        let texts: Vec<&str> = snapshot
            .recent_conversation
            .iter()
            .map(|e| e.text.as_str())
            .collect();
        assert_eq!(texts, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn closed_store_rejects_calls() {
        let db = test_store().await;
        db.close().await;
        db.close().await;

        assert!(matches!(
            db.get_metadata(INTERACTION_COUNT).await,
            Err(StoreError::Closed)
        ));
        assert!(matches!(
            db.learn_fact("a", "b").await,
            Err(StoreError::Closed)
        ));
        assert!(matches!(
            db.append_conversation(Role::User, "hi").await,
            Err(StoreError::Closed)
        ));
    }

    #[tokio::test]
    async fn open_in_missing_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no").join("such").join("memory.db");
        let err = SqliteStore::open(&path).await.err().unwrap();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn store_name() {
        assert_eq!(test_store().await.name(), "sqlite");
    }

    #[test]
    fn non_json_steps_read_as_single_step() {
        assert_eq!(SqliteStore::parse_steps("just do it"), vec!["just do it"]);
        assert_eq!(
            SqliteStore::parse_steps(r#"["a","b"]"#),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
