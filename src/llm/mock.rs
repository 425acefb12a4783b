//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 支持三种行为：Reply 固定文本、Fail 注入错误、Hang 挂起不返回；
//! 先按提示词子串匹配规则，再按脚本队列顺序出队，便于区分规划/合成/研究调用。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{Completion, GenerationRequest, LlmClient, ProviderError, Usage};

/// Mock 行为
#[derive(Debug, Clone)]
pub enum MockBehavior {
    Reply(String),
    Fail(ProviderError),
    /// 挂起（模拟永不返回的调用，供超时路径测试）
    Hang,
}

/// Mock 客户端：规则匹配优先，其次脚本队列，最后 default 行为
pub struct MockLlmClient {
    rules: Vec<(String, MockBehavior)>,
    script: Mutex<VecDeque<MockBehavior>>,
    default: MockBehavior,
    calls: AtomicU64,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            script: Mutex::new(VecDeque::new()),
            default: MockBehavior::Reply("(mock reply)".to_string()),
            calls: AtomicU64::new(0),
        }
    }

    /// 提示词（system + user 拼接）包含 needle 时使用该行为；不消耗脚本
    pub fn with_rule(mut self, needle: impl Into<String>, behavior: MockBehavior) -> Self {
        self.rules.push((needle.into(), behavior));
        self
    }

    /// 追加一个脚本行为（按调用顺序出队）
    pub fn push(self, behavior: MockBehavior) -> Self {
        self.script
            .lock()
            .expect("mock script lock")
            .push_back(behavior);
        self
    }

    /// 脚本耗尽后的缺省行为
    pub fn with_default(mut self, behavior: MockBehavior) -> Self {
        self.default = behavior;
        self
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    fn next_behavior(&self, request: &GenerationRequest) -> MockBehavior {
        let haystack = format!("{}\n{}", request.system_prompt, request.user_prompt);
        for (needle, behavior) in &self.rules {
            if haystack.contains(needle.as_str()) {
                return behavior.clone();
            }
        }
        self.script
            .lock()
            .expect("mock script lock")
            .pop_front()
            .unwrap_or_else(|| self.default.clone())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match self.next_behavior(request) {
            MockBehavior::Reply(text) => Ok(Completion {
                text,
                usage: Usage::default(),
            }),
            MockBehavior::Fail(err) => Err(err),
            MockBehavior::Hang => {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Err(ProviderError::Timeout("mock hang elapsed".to_string()))
            }
        }
    }
}
