//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient::generate：
//! 一次 (system, user) 提示词对 → 生成文本 + token 用量。不做缓存，每次调用都是新的网络往返。

use async_trait::async_trait;
use thiserror::Error;

/// Provider 层错误；is_transient 决定是否值得重试
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// 429 / 限流（瞬时）
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// 请求超时（瞬时）
    #[error("request timed out: {0}")]
    Timeout(String),

    /// 5xx / overloaded 等上游故障（瞬时）
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// 其余 API 错误（非瞬时，立即向上传播）
    #[error("api error: {0}")]
    Api(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// 重试耗尽；message 携带最后一次上游错误
    #[error("retries exhausted after {attempts} attempts: {message}")]
    Exhausted { attempts: u32, message: String },
}

impl ProviderError {
    /// 瞬时错误可重试；Api / InvalidResponse / Exhausted 不可
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited(_) | ProviderError::Timeout(_) | ProviderError::Upstream(_)
        )
    }
}

/// 一次生成请求：模型名 + 提示词对 + 采样参数
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub system_prompt: String,
    pub user_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

/// 单次调用的 token 用量
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// 生成结果：文本 + 用量
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Usage,
}

/// LLM 客户端 trait：非流式单次生成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Completion, ProviderError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
