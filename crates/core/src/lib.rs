//! # keepsake core
//!
//! Domain types, traits, and error definitions for the keepsake assistant.
//! This crate has **no I/O dependencies** — it defines the domain model
//! that all other crates implement against.
//!
//! Every subsystem is a trait here: the memory store, the generation
//! backend and the tools. Implementations live in their own crates.

pub mod agent;
pub mod error;
pub mod generator;
pub mod memory;
pub mod message;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::{MemoryStats, Reply, ReplyStatus, TurnState};
pub use error::{Error, GenerationError, Result, StoreError, ToolError};
pub use generator::{Generator, SamplingOptions};
pub use memory::{MemorySnapshot, MemoryStore};
pub use message::{ConversationEntry, Role};
pub use tool::{Arity, Tool, ToolArgs, ToolCall, ToolRegistry};
