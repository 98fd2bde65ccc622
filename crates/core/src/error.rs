//! Error types for the keepsake domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all keepsake operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Generation errors ---
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the persistent memory store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backing medium could not be opened. Fatal at startup.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A mutating statement failed. Previously committed rows are untouched.
    #[error("Store write failed: {0}")]
    WriteFailed(String),

    /// A query failed. Callers degrade this to the absent value where safe.
    #[error("Store read failed: {0}")]
    ReadFailed(String),

    /// The store was used after `close()`.
    #[error("Store is closed")]
    Closed,
}

/// Failures of the external text-generation collaborator.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("Generation backend unavailable: {0}")]
    Unavailable(String),

    #[error("Generation timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Generation backend rejected the request: {message} (status: {status_code})")]
    Rejected { status_code: u16, message: String },

    #[error("Malformed generation response: {0}")]
    Malformed(String),
}

impl GenerationError {
    /// The apology shown to the user in place of a reply.
    pub fn apology(&self) -> String {
        match self {
            GenerationError::Unavailable(_) => {
                "Sorry, I can't reach my language backend right now. Is it running?".into()
            }
            GenerationError::Timeout { .. } => {
                "Sorry, that took too long and I gave up. Try a shorter message?".into()
            }
            GenerationError::Rejected { status_code, .. } => {
                format!("Sorry, my language backend returned an error ({status_code}).")
            }
            GenerationError::Malformed(_) => {
                "Sorry, I got a reply I couldn't understand.".into()
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("{tool_name} failed: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("{tool_name} timed out after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("Sandbox violation: {0}")]
    SandboxViolation(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_displays_correctly() {
        let err = Error::Store(StoreError::WriteFailed("disk full".into()));
        assert!(err.to_string().contains("disk full"));
        assert!(Error::Store(StoreError::Closed).to_string().contains("closed"));
    }

    #[test]
    fn generation_timeout_mentions_limit() {
        let err = GenerationError::Timeout { timeout_secs: 120 };
        assert!(err.to_string().contains("120"));
        assert!(err.apology().starts_with("Sorry"));
    }

    #[test]
    fn rejected_apology_includes_status() {
        let err = GenerationError::Rejected {
            status_code: 503,
            message: "loading model".into(),
        };
        assert!(err.apology().contains("503"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = ToolError::ExecutionFailed {
            tool_name: "learn_fact".into(),
            reason: "disk full".into(),
        };
        assert_eq!(err.to_string(), "learn_fact failed: disk full");
    }
}
