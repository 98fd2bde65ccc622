//! llama.cpp server backend — `POST /completion`.
//!
//! The server hosts a single model chosen when it was started, so there is
//! no model field in the request.

use async_trait::async_trait;
use keepsake_core::error::GenerationError;
use keepsake_core::generator::{Generator, SamplingOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::http;

pub struct LlamaCppGenerator {
    base_url: String,
    options: SamplingOptions,
    timeout: Duration,
    client: reqwest::Client,
}

impl LlamaCppGenerator {
    pub fn new(base_url: impl Into<String>, options: SamplingOptions, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            options,
            timeout,
            client: http::client(timeout),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
    n_predict: u32,
    temperature: f32,
    top_p: f32,
    stop: &'a [String],
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    content: String,
}

#[async_trait]
impl Generator for LlamaCppGenerator {
    fn name(&self) -> &str {
        "llamacpp"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/completion", self.base_url);
        let body = CompletionRequest {
            prompt,
            n_predict: self.options.max_tokens,
            temperature: self.options.temperature,
            top_p: self.options.top_p,
            stop: &self.options.stop,
            stream: false,
        };
        debug!(prompt_len = prompt.len(), "Sending completion request");

        let reply: CompletionResponse =
            http::post_json(&self.client, &url, &body, self.timeout).await?;
        Ok(reply.content.trim().to_string())
    }

    async fn health_check(&self) -> Result<bool, GenerationError> {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::{dead_addr, serve};
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    type Captured = Arc<Mutex<Vec<Value>>>;

    async fn capture(State(seen): State<Captured>, Json(body): Json<Value>) -> Json<Value> {
        seen.lock().unwrap().push(body);
        Json(json!({ "content": " Sure thing.\n", "stop": true }))
    }

    fn options() -> SamplingOptions {
        SamplingOptions {
            stop: vec!["User:".into(), "\n\n".into()],
            ..SamplingOptions::default()
        }
    }

    #[tokio::test]
    async fn sends_completion_request() {
        let seen: Captured = Arc::default();
        let app = Router::new()
            .route("/completion", post(capture))
            .with_state(seen.clone());
        let addr = serve(app).await;

        let backend = LlamaCppGenerator::new(format!("http://{addr}"), options(), Duration::from_secs(5));
        assert_eq!(backend.generate("prompt").await.unwrap(), "Sure thing.");

        let body = seen.lock().unwrap().pop().unwrap();
        assert_eq!(body["prompt"], "prompt");
        assert_eq!(body["n_predict"], 200);
        assert_eq!(body["stop"], json!(["User:", "\n\n"]));
        assert_eq!(body["stream"], false);
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let app = Router::new().route("/completion", post(|| async { "not json" }));
        let addr = serve(app).await;
        let backend = LlamaCppGenerator::new(format!("http://{addr}"), options(), Duration::from_secs(5));
        assert!(matches!(
            backend.generate("x").await,
            Err(GenerationError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn loading_model_is_rejected() {
        let app = Router::new().route(
            "/completion",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "Loading model") }),
        );
        let addr = serve(app).await;
        let backend = LlamaCppGenerator::new(format!("http://{addr}"), options(), Duration::from_secs(5));
        let err = backend.generate("x").await.unwrap_err();
        assert!(matches!(err, GenerationError::Rejected { status_code: 503, .. }));
        assert!(err.apology().contains("503"));
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = Router::new().route("/health", get(|| async { Json(json!({ "status": "ok" })) }));
        let addr = serve(app).await;
        let backend = LlamaCppGenerator::new(format!("http://{addr}"), options(), Duration::from_secs(5));
        assert!(backend.health_check().await.unwrap());

        let dead = LlamaCppGenerator::new(
            format!("http://{}", dead_addr().await),
            options(),
            Duration::from_secs(1),
        );
        assert!(!dead.health_check().await.unwrap());
        assert!(matches!(
            dead.generate("x").await,
            Err(GenerationError::Unavailable(_))
        ));
    }
}
