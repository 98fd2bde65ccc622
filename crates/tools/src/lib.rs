//! Tools for keepsake.
//!
//! The model requests side effects by writing `TOOL[name](args)` into its
//! reply. [`protocol`] finds and runs those calls; the built-in tools are
//! a sandboxed evaluator ([`execute_code`]) and two teaching tools that
//! write into memory ([`learn`]). Front ends add their own with
//! [`FnTool`].

pub mod callback;
pub mod execute_code;
pub mod learn;
pub mod protocol;
pub mod sandbox;

use keepsake_core::memory::MemoryStore;
use keepsake_core::tool::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;

pub use callback::FnTool;
pub use execute_code::ExecuteCodeTool;
pub use learn::{LearnFactTool, LearnProcedureTool};
pub use protocol::{parse_calls, process, strip_calls};
pub use sandbox::Limits as SandboxLimits;

/// Create a registry with the built-in tools bound to `store`.
pub fn default_registry(
    store: Arc<dyn MemoryStore>,
    limits: SandboxLimits,
    code_timeout: Duration,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ExecuteCodeTool::new(limits, code_timeout)));
    registry.register(Box::new(LearnFactTool::new(store.clone())));
    registry.register(Box::new(LearnProcedureTool::new(store)));
    registry
}
