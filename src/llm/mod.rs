//! LLM 层：Provider 适配（OpenAI 兼容 / Mock）、限速重试、生成模式注册表

pub mod mock;
pub mod modes;
pub mod openai;
pub mod retry;
pub mod traits;

pub use mock::{MockBehavior, MockLlmClient};
pub use modes::{
    fast_model, resolve_profile, GenerationProfile, ResolvedProfile, MODES, PLANNER_MAX_TOKENS,
    PLANNER_STRICT_TEMPERATURE, PLANNER_TEMPERATURE,
};
pub use openai::{OpenAiProvider, TokenUsage};
pub use retry::{
    backoff_delay, create_rate_limiter, RetryConfig, RetryingLlmClient, SharedRateLimiter,
};
pub use traits::{Completion, GenerationRequest, LlmClient, ProviderError, Usage};
