//! Tool trait — the abstraction over side effects the model can request.
//!
//! The model asks for a tool by writing `TOOL[name](arguments)` in its
//! reply. The scanner in `keepsake-tools` turns those spans into
//! [`ToolCall`] records; the [`ToolRegistry`] looks the name up, splits
//! the raw argument text according to the tool's [`Arity`] and runs it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;

use crate::error::ToolError;

/// A tool invocation discovered in generated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier between the brackets
    pub name: String,

    /// Argument text between the parentheses, with escapes resolved
    pub raw_args: String,

    /// Byte range of the whole `TOOL[..](..)` span in the source text
    pub span: Range<usize>,
}

/// How a tool wants its raw argument text delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Arity {
    /// The whole argument text, trimmed of outer whitespace.
    #[default]
    Single,
    /// Two values split on the first comma, each trimmed and unquoted.
    Pair,
}

/// Arguments handed to [`Tool::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolArgs {
    Single(String),
    Pair(String, String),
}

impl ToolArgs {
    /// Shape raw argument text for a tool of the given arity.
    pub fn from_raw(raw: &str, arity: Arity) -> Result<Self, ToolError> {
        match arity {
            Arity::Single => Ok(ToolArgs::Single(raw.trim().to_string())),
            Arity::Pair => {
                let (first, second) = raw.split_once(',').ok_or_else(|| {
                    ToolError::InvalidArguments(
                        "expected two comma-separated arguments".into(),
                    )
                })?;
                Ok(ToolArgs::Pair(
                    unquote(first.trim()).to_string(),
                    unquote(second.trim()).to_string(),
                ))
            }
        }
    }

    /// The single argument, or both halves re-joined with a comma.
    pub fn into_single(self) -> String {
        match self {
            ToolArgs::Single(s) => s,
            ToolArgs::Pair(a, b) => format!("{a}, {b}"),
        }
    }
}

const QUOTE_PAIRS: [(char, char); 4] = [('"', '"'), ('\'', '\''), ('“', '”'), ('‘', '’')];

/// Strip surrounding whitespace and one layer of matching straight or
/// curly quotes. Text inside the quotes is returned exactly as written.
pub fn unquote(s: &str) -> &str {
    let s = s.trim();
    for (open, close) in QUOTE_PAIRS {
        if let Some(inner) = s.strip_prefix(open).and_then(|r| r.strip_suffix(close)) {
            return inner;
        }
    }
    s
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The identifier the model writes between `TOOL[` and `]`.
    fn name(&self) -> &str;

    /// One-line description for the system prompt.
    fn description(&self) -> &str;

    /// Call signature shown to the model, e.g. `learn_fact(topic, fact)`.
    fn usage(&self) -> String {
        format!("{}(input)", self.name())
    }

    fn arity(&self) -> Arity {
        Arity::Single
    }

    /// Run the tool. The returned text is appended to the reply.
    async fn execute(&self, args: ToolArgs) -> Result<String, ToolError>;
}

/// A registry of available tools, iterated in name order.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Render the tool block injected into the system prompt.
    pub fn describe(&self) -> String {
        if self.tools.is_empty() {
            return String::new();
        }
        let mut out = String::from("TOOLS AVAILABLE:\n");
        for tool in self.tools.values() {
            out.push_str(&format!("- {} - {}\n", tool.usage(), tool.description()));
        }
        out.push_str("\nTo use a tool, respond with: TOOL[tool_name](args)\n");
        if self.contains("execute_code") {
            out.push_str("Example: TOOL[execute_code](2 + 2)\n");
        }
        out
    }

    /// Execute a tool call.
    pub async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        let args = ToolArgs::from_raw(&call.raw_args, tool.arity())?;
        tool.execute(args).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
