//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；
//! 请求携带 model / messages / temperature / max_tokens / top_p，取 choices[0].message.content。
//! 上游错误按消息内容分类为瞬时（429 / 超时 / 5xx）或非瞬时，供重试层判断。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{Completion, GenerationRequest, LlmClient, ProviderError, Usage};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// 按上游错误消息分类：限流与 5xx 类为瞬时，其余视为 API 错误
pub(crate) fn classify_upstream_error(message: String) -> ProviderError {
    let lower = message.to_lowercase();
    if lower.contains("429")
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests")
    {
        ProviderError::RateLimited(message)
    } else if lower.contains("timed out") || lower.contains("timeout") {
        ProviderError::Timeout(message)
    } else if lower.contains("500")
        || lower.contains("502")
        || lower.contains("503")
        || lower.contains("504")
        || lower.contains("server_error")
        || lower.contains("internal server")
        || lower.contains("overloaded")
    {
        ProviderError::Upstream(message)
    } else {
        ProviderError::Api(message)
    }
}

/// OpenAI 兼容客户端：持有 Client 与请求超时，generate 时组 (system, user) 两条消息
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    request_timeout: Duration,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiProvider {
    pub fn new(base_url: Option<&str>, api_key: Option<&str>, request_timeout_secs: u64) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            request_timeout: Duration::from_secs(request_timeout_secs),
            usage: TokenUsage::new(),
        }
    }

    fn to_openai_messages(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<ChatCompletionRequestMessage>, ProviderError> {
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(request.system_prompt.clone())
            .build()
            .map_err(|e| ProviderError::Api(e.to_string()))?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(request.user_prompt.clone())
            .build()
            .map_err(|e| ProviderError::Api(e.to_string()))?;
        Ok(vec![
            ChatCompletionRequestMessage::System(system),
            ChatCompletionRequestMessage::User(user),
        ])
    }
}

#[async_trait]
impl LlmClient for OpenAiProvider {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Completion, ProviderError> {
        let api_request = CreateChatCompletionRequestArgs::default()
            .model(&request.model)
            .messages(self.to_openai_messages(request)?)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens)
            .top_p(request.top_p)
            .build()
            .map_err(|e| ProviderError::Api(e.to_string()))?;

        let response = tokio::time::timeout(
            self.request_timeout,
            self.client.chat().create(api_request),
        )
        .await
        .map_err(|_| {
            ProviderError::Timeout(format!(
                "no response within {}s",
                self.request_timeout.as_secs()
            ))
        })?
        .map_err(|e| classify_upstream_error(e.to_string()))?;

        let usage = match &response.usage {
            Some(u) => {
                self.usage
                    .add(u.prompt_tokens as u64, u.completion_tokens as u64);
                Usage {
                    prompt_tokens: u.prompt_tokens as u64,
                    completion_tokens: u.completion_tokens as u64,
                    total_tokens: u.total_tokens as u64,
                }
            }
            None => Usage::default(),
        };

        let text = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| ProviderError::InvalidResponse("empty choices".to_string()))?;

        Ok(Completion { text, usage })
    }
}
