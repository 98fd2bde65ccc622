//! Request plumbing shared by the HTTP backends.

use keepsake_core::error::GenerationError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{trace, warn};

/// Build a client whose own timeout matches the generation ceiling.
pub(crate) fn client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

fn send_error(e: reqwest::Error, timeout: Duration) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout {
            timeout_secs: timeout.as_secs(),
        }
    } else {
        GenerationError::Unavailable(e.to_string())
    }
}

/// POST `body` as JSON and decode a JSON reply.
pub(crate) async fn post_json<B, T>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
    timeout: Duration,
) -> Result<T, GenerationError>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| send_error(e, timeout))?;

    let status = response.status().as_u16();
    if status != 200 {
        let error_body = response.text().await.unwrap_or_default();
        warn!(status, body = %error_body, "Backend returned error");
        return Err(GenerationError::Rejected {
            status_code: status,
            message: error_body,
        });
    }

    let text = response.text().await.map_err(|e| send_error(e, timeout))?;
    trace!(body = %text, "Backend response");
    serde_json::from_str(&text)
        .map_err(|e| GenerationError::Malformed(format!("Failed to parse response: {e}")))
}
