//! Generator trait — the abstraction over text-completion backends.
//!
//! A generator takes one fully assembled prompt and returns the raw
//! completion text. It knows nothing about memory or tools; the
//! coordinator owns the prompt and post-processes the reply.
//!
//! Implementations: Ollama, llama.cpp server.

use async_trait::async_trait;

use crate::error::GenerationError;

/// Sampling parameters shared by the HTTP backends.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingOptions {
    pub temperature: f32,
    pub top_p: f32,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Context window requested from the backend
    pub context_size: u32,
    pub threads: u32,
    /// Stop sequences (honoured by backends that support them)
    pub stop: Vec<String>,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_p: 0.9,
            max_tokens: 200,
            context_size: 2048,
            threads: 4,
            stop: Vec::new(),
        }
    }
}

/// The core Generator trait.
#[async_trait]
pub trait Generator: Send + Sync {
    /// A human-readable name for this backend (e.g., "ollama").
    fn name(&self) -> &str;

    /// Produce a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Health check — can we reach the backend?
    async fn health_check(&self) -> Result<bool, GenerationError> {
        Ok(true)
    }
}
