//! The keepsake turn loop.
//!
//! A [`Coordinator`] owns one memory store, one generation backend and the
//! tool registry, and runs conversation turns one at a time:
//!
//! 1. **Record** the user message and bump the interaction counter
//! 2. **Summarize** memory into a short digest ([`ContextBuilder`])
//! 3. **Generate** a reply from the assembled prompt
//! 4. **Run tools** the reply asks for with `TOOL[name](args)`
//! 5. **Persist** the reply and prune old conversation entries
//!
//! Front ends also get a direct teaching interface
//! ([`Coordinator::teach_procedure`]) for multi-step procedures.

pub mod coordinator;
pub mod prompt;
pub mod summary;

pub use coordinator::{Coordinator, CoordinatorBuilder, ProcedureRecall};
pub use summary::ContextBuilder;
