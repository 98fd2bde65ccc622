//! Backend selection — builds the configured generator.

use keepsake_config::{BackendConfig, BackendKind};
use keepsake_core::generator::{Generator, SamplingOptions};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::llamacpp::LlamaCppGenerator;
use crate::ollama::OllamaGenerator;

/// Sampling parameters as configured.
pub fn sampling_options(config: &BackendConfig) -> SamplingOptions {
    SamplingOptions {
        temperature: config.temperature,
        top_p: config.top_p,
        max_tokens: config.max_tokens,
        context_size: config.context_size,
        threads: config.threads,
        stop: config.stop.clone(),
    }
}

/// Build the generator described by `config`.
pub fn build_from_config(config: &BackendConfig) -> Arc<dyn Generator> {
    let host = config.host();
    let options = sampling_options(config);
    let timeout = Duration::from_secs(config.timeout_secs);

    info!(backend = %config.kind, host = %host, "Using generation backend");
    match config.kind {
        BackendKind::Ollama => Arc::new(OllamaGenerator::new(
            host,
            config.model.clone(),
            options,
            timeout,
        )),
        BackendKind::LlamaCpp => Arc::new(LlamaCppGenerator::new(host, options, timeout)),
    }
}
