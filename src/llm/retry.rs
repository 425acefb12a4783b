//! Provider 限速与重试
//!
//! RetryingLlmClient 包装任意 LlmClient：每次尝试前等待进程级限速器许可，
//! 瞬时错误（429 / 超时 / 5xx）按封顶指数退避 + 对称抖动重试，最多 max_retries 次；
//! 非瞬时错误立即向上传播；耗尽后返回携带最后一次上游消息的 Exhausted。

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::Deserialize;

use crate::llm::{Completion, GenerationRequest, LlmClient, ProviderError};

/// 进程级共享限速器（所有并发请求命中同一 Provider 时共用）
pub type SharedRateLimiter =
    Arc<RateLimiter<NotKeyed, InMemoryState, governor::clock::DefaultClock>>;

/// 按每秒请求数创建限速器
pub fn create_rate_limiter(requests_per_second: u32) -> SharedRateLimiter {
    let quota = Quota::per_second(
        NonZeroU32::new(requests_per_second).unwrap_or_else(|| NonZeroU32::new(1).expect("1 > 0")),
    );
    Arc::new(RateLimiter::direct(quota))
}

/// 重试参数
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// 最大重试次数（总尝试 = max_retries + 1）
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// 抖动幅度 0.0-1.0（0.2 表示在基准值 ±20% 内波动）
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_retries() -> u32 {
    2
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    8_000
}
fn default_jitter_factor() -> f64 {
    0.2
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

/// 封顶指数退避：min(max_delay, base * 2^attempt) * (1 + (random*2-1) * jitter)
pub fn backoff_delay(attempt: u32, config: &RetryConfig, random: f64) -> u64 {
    let exponential = config.base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(config.max_delay_ms);
    let jitter = 1.0 + (random * 2.0 - 1.0) * config.jitter_factor;
    ((capped as f64) * jitter).round().max(0.0) as u64
}

/// 带限速与重试的 LLM 客户端包装
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
    limiter: Option<SharedRateLimiter>,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            limiter: None,
        }
    }

    /// 设置进程级限速器
    pub fn with_rate_limiter(mut self, limiter: SharedRateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Completion, ProviderError> {
        let mut last_message = String::new();
        for attempt in 0..=self.config.max_retries {
            if let Some(ref limiter) = self.limiter {
                limiter.until_ready().await;
            }

            match self.inner.generate(request).await {
                Ok(completion) => return Ok(completion),
                Err(e) if e.is_transient() => {
                    last_message = e.to_string();
                    if attempt < self.config.max_retries {
                        let delay =
                            backoff_delay(attempt, &self.config, rand::random::<f64>());
                        tracing::warn!(
                            model = %request.model,
                            attempt = attempt + 1,
                            delay_ms = delay,
                            error = %last_message,
                            "transient provider error, backing off"
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(ProviderError::Exhausted {
            attempts: self.config.max_retries + 1,
            message: last_message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockBehavior, MockLlmClient};
    use std::time::Instant;

    fn quick_config() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay_ms: 30,
            max_delay_ms: 200,
            jitter_factor: 0.0,
        }
    }

    fn request() -> GenerationRequest {
        GenerationRequest {
            model: "gpt-4o-mini".to_string(),
            system_prompt: "s".to_string(),
            user_prompt: "u".to_string(),
            temperature: 0.2,
            max_tokens: 100,
            top_p: 0.9,
        }
    }

    #[test]
    fn test_backoff_exponential_growth() {
        let config = quick_config();
        assert_eq!(backoff_delay(0, &config, 0.5), 30);
        assert_eq!(backoff_delay(1, &config, 0.5), 60);
        assert_eq!(backoff_delay(2, &config, 0.5), 120);
        // 封顶
        assert_eq!(backoff_delay(5, &config, 0.5), 200);
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let config = RetryConfig {
            jitter_factor: 0.2,
            ..quick_config()
        };
        assert_eq!(backoff_delay(0, &config, 0.0), 24);
        assert_eq!(backoff_delay(0, &config, 0.5), 30);
        assert_eq!(backoff_delay(0, &config, 1.0), 36);
    }

    #[test]
    fn test_backoff_high_attempt_no_overflow() {
        let config = quick_config();
        assert_eq!(backoff_delay(100, &config, 0.5), 200);
    }

    #[tokio::test]
    async fn test_three_rate_limits_exhaust_after_three_attempts() {
        let mock = Arc::new(MockLlmClient::new().with_default(MockBehavior::Fail(
            ProviderError::RateLimited("HTTP 429".to_string()),
        )));
        let client = RetryingLlmClient::new(mock.clone(), quick_config());

        let start = Instant::now();
        let result = client.generate(&request()).await;
        let elapsed = start.elapsed();

        match result {
            Err(ProviderError::Exhausted { attempts, message }) => {
                assert_eq!(attempts, 3);
                assert!(message.contains("429"));
            }
            other => panic!("expected Exhausted, got {:?}", other.map(|c| c.text)),
        }
        assert_eq!(mock.call_count(), 3);
        // 两次退避：30ms + 60ms
        assert!(
            elapsed.as_millis() >= 90,
            "expected >=90ms of backoff, got {}ms",
            elapsed.as_millis()
        );
    }

    #[tokio::test]
    async fn test_non_transient_error_not_retried() {
        let mock = Arc::new(MockLlmClient::new().with_default(MockBehavior::Fail(
            ProviderError::Api("invalid api key".to_string()),
        )));
        let client = RetryingLlmClient::new(mock.clone(), quick_config());

        let result = client.generate(&request()).await;
        assert!(matches!(result, Err(ProviderError::Api(_))));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let mock = Arc::new(
            MockLlmClient::new()
                .push(MockBehavior::Fail(ProviderError::Upstream(
                    "503".to_string(),
                )))
                .push(MockBehavior::Reply("recovered".to_string())),
        );
        let client = RetryingLlmClient::new(mock.clone(), quick_config());

        let result = client.generate(&request()).await.expect("should recover");
        assert_eq!(result.text, "recovered");
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_rate_limiter_allows_first_request() {
        let mock = Arc::new(MockLlmClient::new().with_default(MockBehavior::Reply(
            "ok".to_string(),
        )));
        let client = RetryingLlmClient::new(mock, quick_config())
            .with_rate_limiter(create_rate_limiter(10));
        let result = client.generate(&request()).await.expect("should pass limiter");
        assert_eq!(result.text, "ok");
    }
}
