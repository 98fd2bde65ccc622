//! The `TOOL[name](args)` protocol: finding calls in generated text,
//! running them, and splicing the results back in.
//!
//! Grammar, scanned left to right:
//!
//! ```text
//! call  = "TOOL[" ident "](" args ")"
//! ident = [A-Za-z0-9_]+
//! args  = any text; parentheses nest, "\(" and "\)" are literal
//! ```
//!
//! When the parentheses inside the arguments never balance (an emoticon
//! like `:(` is enough), the call ends at the first unescaped `)` instead.
//! A `TOOL[` with no closing `)` at all is left in the text as-is.

use keepsake_core::error::ToolError;
use keepsake_core::tool::{ToolCall, ToolRegistry};
use tracing::{debug, warn};

const OPEN: &str = "TOOL[";

/// Find every well-formed tool call in `text`, in order of appearance.
pub fn parse_calls(text: &str) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find(OPEN) {
        let start = cursor + offset;
        match scan_call(text, start) {
            Some(call) => {
                cursor = call.span.end;
                calls.push(call);
            }
            None => cursor = start + OPEN.len(),
        }
    }

    calls
}

/// Try to read one call starting at `start`, which points at `TOOL[`.
fn scan_call(text: &str, start: usize) -> Option<ToolCall> {
    let bytes = text.as_bytes();
    let name_start = start + OPEN.len();
    let mut i = name_start;
    while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    if i == name_start || !text[i..].starts_with("](") {
        return None;
    }
    let name = text[name_start..i].to_string();

    // All delimiters are ASCII, so byte offsets always land on char boundaries.
    let mut raw_args = String::new();
    let mut first_close: Option<(String, usize)> = None;
    let mut depth = 0usize;
    let mut segment = i + 2;
    let mut j = segment;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' if matches!(bytes.get(j + 1), Some(b'(' | b')')) => {
                raw_args.push_str(&text[segment..j]);
                raw_args.push(bytes[j + 1] as char);
                j += 2;
                segment = j;
            }
            b'(' => {
                depth += 1;
                j += 1;
            }
            b')' if depth == 0 => {
                raw_args.push_str(&text[segment..j]);
                return Some(ToolCall {
                    name,
                    raw_args,
                    span: start..j + 1,
                });
            }
            b')' => {
                if first_close.is_none() {
                    first_close = Some((format!("{raw_args}{}", &text[segment..j]), j));
                }
                depth -= 1;
                j += 1;
            }
            _ => j += 1,
        }
    }

    first_close.map(|(raw_args, close)| ToolCall {
        name,
        raw_args,
        span: start..close + 1,
    })
}

/// Remove the call spans, leaving the surrounding text byte-for-byte.
pub fn strip_calls(text: &str, calls: &[ToolCall]) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut last = 0;
    for call in calls {
        cleaned.push_str(&text[last..call.span.start]);
        last = call.span.end;
    }
    cleaned.push_str(&text[last..]);
    cleaned
}

/// Run every call found in `text` and return the user-visible reply.
///
/// With no calls the input comes back untouched. Otherwise the spans are
/// removed, each result is appended on its own line in discovery order,
/// and the whole reply is trimmed. Unknown tools are dropped without a
/// result line; any other failure becomes an `Error: ...` line.
pub async fn process(text: &str, registry: &ToolRegistry) -> String {
    let calls = parse_calls(text);
    if calls.is_empty() {
        return text.to_string();
    }

    let mut reply = strip_calls(text, &calls);
    for call in &calls {
        match registry.execute(call).await {
            Ok(output) => {
                debug!(tool = %call.name, "Tool call succeeded");
                reply.push('\n');
                reply.push_str(&output);
            }
            Err(ToolError::NotFound(name)) => {
                debug!(tool = %name, "Ignoring call to unknown tool");
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool call failed");
                reply.push('\n');
                reply.push_str(&format!("Error: {e}"));
            }
        }
    }

    reply.trim().to_string()
}
