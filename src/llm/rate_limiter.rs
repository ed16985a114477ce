use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{LanguageModel, LlmError, Message};

/// Upper bound on the spacing between calls
const MAX_INTERVAL: Duration = Duration::from_secs(3600);

/// Spaces calls so that at most `requests_per_second` start each second
pub struct RateLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64) -> Self {
        let interval = if requests_per_second > 0.0 {
            Duration::try_from_secs_f64(1.0 / requests_per_second)
                .unwrap_or(MAX_INTERVAL)
                .min(MAX_INTERVAL)
        } else {
            Duration::ZERO
        };
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Waits until the next call slot is free
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// A model whose calls go through a shared rate limiter
pub struct RateLimited {
    inner: Arc<dyn LanguageModel>,
    limiter: Arc<RateLimiter>,
}

impl RateLimited {
    pub fn new(inner: Arc<dyn LanguageModel>, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl LanguageModel for RateLimited {
    async fn invoke(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.limiter.acquire().await;
        self.inner.invoke(messages).await
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}
