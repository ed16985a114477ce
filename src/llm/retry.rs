use log::warn;
use reqwest::RequestBuilder;
use serde_json::Value;
use std::time::Duration;

use super::LlmError;

const MAX_RETRIES: u32 = 3;
const BASE_DELAY_MS: u64 = 2000;

pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Delay before retry `attempt` (1-based): 2s, 4s, 8s
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(BASE_DELAY_MS * (1 << (attempt.saturating_sub(1))))
}

/// Sends a JSON request built by `build`, retrying transient failures, and returns the JSON body
pub(crate) async fn send_json_with_retry<F>(provider: &'static str, build: F) -> Result<Value, LlmError>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            warn!(
                "[{}] Retry attempt {}/{} after {}ms delay",
                provider,
                attempt,
                MAX_RETRIES,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        let response = match build().send().await {
            Ok(response) => response,
            Err(e) if (e.is_connect() || e.is_timeout()) && attempt < MAX_RETRIES => {
                warn!("[{}] Request failed (attempt {}): {}, will retry", provider, attempt + 1, e);
                attempt += 1;
                continue;
            }
            Err(source) => return Err(LlmError::Request { provider, source }),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if is_retryable_status(status.as_u16()) && attempt < MAX_RETRIES {
                warn!(
                    "[{}] Received retryable status {} (attempt {}), will retry",
                    provider,
                    status,
                    attempt + 1
                );
                attempt += 1;
                continue;
            }
            return Err(LlmError::Status {
                provider,
                status: status.as_u16(),
                body,
            });
        }

        return response
            .json::<Value>()
            .await
            .map_err(|source| LlmError::Request { provider, source });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(401));
    }

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        assert_eq!(backoff_delay(3), Duration::from_secs(8));
    }
}
