//! Ollama backend — `POST /api/generate` with streaming disabled.

use async_trait::async_trait;
use keepsake_core::error::GenerationError;
use keepsake_core::generator::{Generator, SamplingOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::http;

pub struct OllamaGenerator {
    base_url: String,
    model: String,
    options: SamplingOptions,
    timeout: Duration,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        options: SamplingOptions,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            options,
            timeout,
            client: http::client(timeout),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request<'a>(&'a self, prompt: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: ApiOptions {
                temperature: self.options.temperature,
                top_p: self.options.top_p,
                num_predict: self.options.max_tokens,
                num_ctx: self.options.context_size,
                num_thread: self.options.threads,
                stop: &self.options.stop,
            },
        }
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(model = %self.model, prompt_len = prompt.len(), "Sending generate request");

        let reply: GenerateResponse =
            http::post_json(&self.client, &url, &self.request(prompt), self.timeout).await?;
        Ok(reply.response.trim().to_string())
    }

    async fn health_check(&self) -> Result<bool, GenerationError> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: ApiOptions<'a>,
}

#[derive(Serialize)]
struct ApiOptions<'a> {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
    num_ctx: u32,
    num_thread: u32,
    #[serde(skip_serializing_if = "no_stops")]
    stop: &'a [String],
}

fn no_stops(stop: &&[String]) -> bool {
    stop.is_empty()
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
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
        Json(json!({ "model": "test", "response": "  Hello there!  ", "done": true }))
    }

    fn generator(addr: std::net::SocketAddr, timeout: Duration) -> OllamaGenerator {
        OllamaGenerator::new(
            format!("http://{addr}/"),
            "qwen2.5:1.5b-instruct",
            SamplingOptions::default(),
            timeout,
        )
    }

    #[tokio::test]
    async fn sends_prompt_and_options() {
        let seen: Captured = Arc::default();
        let app = Router::new()
            .route("/api/generate", post(capture))
            .with_state(seen.clone());
        let addr = serve(app).await;

        let reply = generator(addr, Duration::from_secs(5))
            .generate("User: hi\nAssistant:")
            .await
            .unwrap();
        assert_eq!(reply, "Hello there!");

        let body = seen.lock().unwrap().pop().unwrap();
        assert_eq!(body["model"], "qwen2.5:1.5b-instruct");
        assert_eq!(body["prompt"], "User: hi\nAssistant:");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 200);
        assert_eq!(body["options"]["num_ctx"], 2048);
        assert_eq!(body["options"]["num_thread"], 4);
        assert!(body["options"].get("stop").is_none());
    }

    #[tokio::test]
    async fn server_error_is_rejected() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async { (StatusCode::NOT_FOUND, "model not found") }),
        );
        let addr = serve(app).await;

        let err = generator(addr, Duration::from_secs(5))
            .generate("hi")
            .await
            .unwrap_err();
        match err {
            GenerationError::Rejected {
                status_code,
                message,
            } => {
                assert_eq!(status_code, 404);
                assert_eq!(message, "model not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_field_is_malformed() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async { Json(json!({ "done": true })) }),
        );
        let addr = serve(app).await;

        let err = generator(addr, Duration::from_secs(5))
            .generate("hi")
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Malformed(_)));
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({ "response": "late" }))
            }),
        );
        let addr = serve(app).await;

        let err = generator(addr, Duration::from_millis(200))
            .generate("hi")
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Timeout { .. }));
    }

    #[tokio::test]
    async fn unreachable_backend_is_unavailable() {
        let addr = dead_addr().await;
        let backend = generator(addr, Duration::from_secs(2));
        let err = backend.generate("hi").await.unwrap_err();
        assert!(matches!(err, GenerationError::Unavailable(_)));
        assert!(!backend.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn health_check_hits_tags() {
        let app = Router::new().route("/api/tags", get(|| async { Json(json!({ "models": [] })) }));
        let addr = serve(app).await;
        assert!(generator(addr, Duration::from_secs(2)).health_check().await.unwrap());
    }
}
