//! Conversation log value objects.
//!
//! A turn produces two entries: the user's message and the assistant's
//! reply. Entries are ordered by their store-assigned sequence id; the
//! timestamp is for display only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The assistant
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Single-letter tag used in the compact context summary.
    pub fn letter(&self) -> char {
        match self {
            Role::User => 'U',
            Role::Assistant => 'A',
        }
    }

    /// Parse a stored role string. Anything that is not `user` is
    /// treated as the assistant.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("user") {
            Role::User
        } else {
            Role::Assistant
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single record of the append-only conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// Monotonic sequence id assigned by the store
    pub id: i64,

    /// Wall-clock time of the append (not assumed monotonic)
    pub timestamp: DateTime<Utc>,

    pub role: Role,

    pub text: String,
}
