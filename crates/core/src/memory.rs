//! Memory store trait — the assistant's durable state.
//!
//! The store owns six logical tables: metadata, user attributes, settings,
//! facts, procedures and the conversation log. Every mutating call commits
//! before it returns. A read of a missing key yields the absent value
//! (`None`, an empty map), never an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::message::{ConversationEntry, Role};

/// Metadata key holding the number of completed chat turns.
pub const INTERACTION_COUNT: &str = "interaction_count";

/// Metadata key holding the RFC 3339 time of the very first open.
pub const FIRST_INTERACTION: &str = "first_interaction";

/// Number of conversation entries kept after each turn.
pub const DEFAULT_HISTORY_KEEP_LAST: usize = 20;

/// Read-only diagnostic view of every table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub metadata: BTreeMap<String, String>,
    pub user_attributes: BTreeMap<String, String>,
    pub settings: BTreeMap<String, String>,
    pub facts: BTreeMap<String, String>,
    pub procedures: BTreeMap<String, Vec<String>>,
    pub recent_conversation: Vec<ConversationEntry>,
}

/// The persistent memory contract.
///
/// Implementations: SQLite (file or in-memory).
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// The backend name (e.g., "sqlite").
    fn name(&self) -> &str;

    // --- metadata ---

    async fn get_metadata(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_metadata(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Atomically add one to `interaction_count` and return the new value.
    async fn increment_interaction_count(&self) -> Result<u64, StoreError>;

    // --- user attributes ---

    async fn get_user_attribute(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn user_attributes(&self) -> Result<BTreeMap<String, String>, StoreError>;

    async fn set_user_attribute(&self, key: &str, value: &str) -> Result<(), StoreError>;

    // --- settings ---

    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn settings(&self) -> Result<BTreeMap<String, String>, StoreError>;

    async fn set_setting(&self, key: &str, value: &str) -> Result<(), StoreError>;

    // --- facts ---

    /// Remember `content` under `topic`, replacing any previous content.
    /// Returns a confirmation sentence that names the topic.
    async fn learn_fact(&self, topic: &str, content: &str) -> Result<String, StoreError>;

    async fn get_fact(&self, topic: &str) -> Result<Option<String>, StoreError>;

    async fn list_facts(&self) -> Result<BTreeMap<String, String>, StoreError>;

    async fn count_facts(&self) -> Result<usize, StoreError>;

    // --- procedures ---

    /// Remember an ordered list of steps under `name`. Re-teaching a name
    /// replaces the whole sequence.
    async fn learn_procedure(&self, name: &str, steps: &[String]) -> Result<String, StoreError>;

    async fn get_procedure(&self, name: &str) -> Result<Option<Vec<String>>, StoreError>;

    /// Procedure names in lexical order.
    async fn list_procedure_names(&self) -> Result<Vec<String>, StoreError>;

    async fn list_procedures(&self) -> Result<BTreeMap<String, Vec<String>>, StoreError>;

    // --- conversation log ---

    /// Append an entry and return its sequence id.
    async fn append_conversation(&self, role: Role, text: &str) -> Result<i64, StoreError>;

    /// The most recent `limit` entries, oldest first.
    async fn recent_conversation(&self, limit: usize)
    -> Result<Vec<ConversationEntry>, StoreError>;

    /// Delete everything except the newest `keep_last` entries. Idempotent.
    async fn prune_conversation(&self, keep_last: usize) -> Result<u64, StoreError>;

    // --- diagnostics & lifecycle ---

    async fn export_all(&self) -> Result<MemorySnapshot, StoreError>;

    /// Release the underlying resources. Later calls fail with `StoreError::Closed`.
    async fn close(&self);
}
