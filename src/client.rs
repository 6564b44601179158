//! JSON-over-HTTP calls with retry and backoff, shared by the providers.
//!
//! Retry strategy:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use kb_answer_core::error::ServiceError;

/// Build a client with the given request timeout.
pub fn build_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// `{base_url}/{path}` without doubling the slash.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

/// Delay before retry number `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
}

/// POST `body` as JSON and decode the response as `R`, retrying transient failures.
pub async fn post_json<B, R>(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    body: &B,
    max_retries: u32,
) -> Result<R, ServiceError>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            tracing::debug!(url, attempt, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    let text = response
                        .text()
                        .await
                        .map_err(|e| ServiceError::Transport(e.to_string()))?;
                    return serde_json::from_str(&text)
                        .map_err(|e| ServiceError::InvalidResponse(e.to_string()));
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = ServiceError::Status {
                    status: status.as_u16(),
                    body: body_text,
                };

                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::warn!(url, status = status.as_u16(), attempt, "transient upstream error");
                    last_err = Some(err);
                    continue;
                }

                return Err(err);
            }
            Err(e) => {
                tracing::warn!(url, error = %e, attempt, "request failed");
                last_err = Some(ServiceError::Transport(e.to_string()));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| ServiceError::Transport("request failed after retries".into())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join() {
        assert_eq!(endpoint("http://h:1/v1", "embeddings"), "http://h:1/v1/embeddings");
        assert_eq!(endpoint("http://h:1/v1/", "chat/completions"), "http://h:1/v1/chat/completions");
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(4), Duration::from_secs(8));
        assert_eq!(backoff_delay(6), Duration::from_secs(32));
        assert_eq!(backoff_delay(20), Duration::from_secs(32));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let client = build_client(1).unwrap();
        let err = post_json::<_, serde_json::Value>(
            &client,
            "http://127.0.0.1:9/v1/embeddings",
            None,
            &serde_json::json!({}),
            0,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ServiceError::Transport(_)));
    }
}
