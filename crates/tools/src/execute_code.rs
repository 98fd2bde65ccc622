//! `execute_code` tool — runs a snippet in the sandbox evaluator.
//!
//! Evaluation happens on a blocking thread. The evaluator stops itself at
//! the timeout; an outer timer with a short grace period backs that up.
//! Evaluation errors are not tool failures: they come back as an
//! `Error: <message>` result line, the same way a calculator shows them.
//! Importing anything but `math` is reported as a sandbox violation.

use async_trait::async_trait;
use keepsake_core::error::ToolError;
use keepsake_core::tool::{Tool, ToolArgs};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::sandbox::{self, Limits, SandboxError};

/// Extra time the outer timer allows for the evaluator to notice its deadline.
const DEADLINE_GRACE: Duration = Duration::from_millis(250);

pub struct ExecuteCodeTool {
    limits: Limits,
    timeout: Duration,
}

impl ExecuteCodeTool {
    pub fn new(limits: Limits, timeout: Duration) -> Self {
        Self { limits, timeout }
    }

    fn timed_out(&self) -> ToolError {
        ToolError::Timeout {
            tool_name: self.name().to_string(),
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }
}

impl Default for ExecuteCodeTool {
    fn default() -> Self {
        Self::new(Limits::default(), Duration::from_secs(2))
    }
}

#[async_trait]
impl Tool for ExecuteCodeTool {
    fn name(&self) -> &str {
        "execute_code"
    }

    fn description(&self) -> &str {
        "Run a short Python-style snippet for math or calculations (math module available)"
    }

    fn usage(&self) -> String {
        "execute_code(code)".into()
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        let code = args.into_single();
        let limits = self.limits.clone();
        debug!(code = %code, "Evaluating sandboxed code");

        let deadline = Instant::now() + self.timeout;
        let task =
            tokio::task::spawn_blocking(move || sandbox::evaluate_until(&code, limits, Some(deadline)));
        let joined = tokio::time::timeout(self.timeout + DEADLINE_GRACE, task)
            .await
            .map_err(|_| self.timed_out())?;
        let outcome = joined.map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })?;

        match outcome {
            Ok(text) => Ok(format!("Result: {text}")),
            Err(e @ SandboxError::ForbiddenImport(_)) => {
                warn!(error = %e, "Blocked sandbox escape attempt");
                Err(ToolError::SandboxViolation(e.to_string()))
            }
            Err(SandboxError::Deadline) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Sandboxed code ran out of time");
                Err(self.timed_out())
            }
            Err(e) => Ok(format!("Error: {e}")),
        }
    }
}
