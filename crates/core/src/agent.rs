//! Turn state and reply types.

use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// Where the coordinator is within a single chat turn.
///
/// `Idle → AwaitingGeneration → ProcessingTools → Persisted → Idle`.
/// A failed generation jumps straight back to `Idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    #[default]
    Idle,
    AwaitingGeneration,
    ProcessingTools,
    Persisted,
}

/// How a turn ended.
#[derive(Debug, Clone)]
pub enum ReplyStatus {
    /// The backend answered and the reply was recorded.
    Completed,
    /// The backend failed; `text` holds an apology and nothing was recorded
    /// for the assistant. The user message stays committed.
    Apology(GenerationError),
}

/// The user-visible outcome of one turn.
#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub status: ReplyStatus,
}

impl Reply {
    pub fn completed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            status: ReplyStatus::Completed,
        }
    }

    pub fn apology(error: GenerationError) -> Self {
        Self {
            text: error.apology(),
            status: ReplyStatus::Apology(error),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.status, ReplyStatus::Completed)
    }
}

/// Counters shown by the front end's "stats" view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub interaction_count: u64,
    pub facts_count: usize,
    pub procedures: Vec<String>,
    pub online: bool,
}
