//! Caller-supplied tools backed by a closure.

use async_trait::async_trait;
use keepsake_core::error::ToolError;
use keepsake_core::tool::{Tool, ToolArgs};

type Handler = dyn Fn(&str) -> Result<String, ToolError> + Send + Sync;

/// A single-argument tool whose behaviour is a plain function.
///
/// ```
/// use keepsake_tools::FnTool;
///
/// let shout = FnTool::new("shout", "Upper-cases its input", |s| Ok(s.to_uppercase()));
/// # let _ = shout;
/// ```
pub struct FnTool {
    name: String,
    description: String,
    handler: Box<Handler>,
}

impl FnTool {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&str) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            handler: Box::new(handler),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError> {
        (self.handler)(&args.into_single())
    }
}
