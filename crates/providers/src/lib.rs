//! Text-generation backends for keepsake.
//!
//! All backends implement the `keepsake_core::Generator` trait. Each one is
//! a single non-streaming HTTP request to a locally running server.
//! [`build_from_config`] picks the backend named in the configuration.

mod http;
pub mod llamacpp;
pub mod ollama;
pub mod router;

pub use llamacpp::LlamaCppGenerator;
pub use ollama::OllamaGenerator;
pub use router::{build_from_config, sampling_options};
