//! 会话压缩
//!
//! 超过软上限时把头部消息压成一条 "Conversation summary: ..." 合成消息，尾部原样保留。
//! 摘要优先走一次模型调用（保留人名/球队/赛季/意图，6-8 行纯文本）；
//! 任何失败回退到朴素摘要（最近 20 条各取末句，" | " 连接，截断 1000 字符）。
//! 压缩绝不抛错，重复调用幂等。

use std::sync::Arc;

use crate::error::AgentError;
use crate::llm::{GenerationRequest, LlmClient};
use crate::memory::store::ConversationStore;
use crate::memory::thread::{Message, Role};

/// 朴素摘要取材的消息条数
const NAIVE_SOURCE_MESSAGES: usize = 20;
const NAIVE_MAX_CHARS: usize = 1000;

/// 消息的末句（句号/问号/叹号切分；没有终止符就用整条）
fn last_sentence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .rsplit(['.', '!', '?'])
        .find(|part| !part.trim().is_empty())
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// 朴素摘要：最近 20 条各取末句，" | " 连接，截断 1000 字符
pub fn naive_summary(messages: &[Message]) -> String {
    let start = messages.len().saturating_sub(NAIVE_SOURCE_MESSAGES);
    let joined = messages[start..]
        .iter()
        .map(|m| last_sentence(&m.text))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" | ");
    if joined.chars().count() > NAIVE_MAX_CHARS {
        joined.chars().take(NAIVE_MAX_CHARS).collect()
    } else {
        joined
    }
}

/// Compactor：持有摘要用的 LLM 与模型名
pub struct Compactor {
    llm: Arc<dyn LlmClient>,
    model: String,
}

impl Compactor {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    /// 若线程超过软上限则压缩；所有失败路径回退朴素摘要，绝不向上抛错
    pub async fn maybe_compact(&self, store: &ConversationStore, key: &str) {
        let Some(messages) = store.compaction_snapshot(key).await else {
            return;
        };
        let config = store.config();
        let split = messages.len().saturating_sub(config.summary_compact_to);
        let head = &messages[..split];

        let summary = match self.summarize(head).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                tracing::debug!(key = %key, "empty model summary, using naive fallback");
                naive_summary(&messages)
            }
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "summarization failed, using naive fallback");
                naive_summary(&messages)
            }
        };

        store
            .apply_compaction(key, &format!("Conversation summary: {summary}"))
            .await;
        tracing::info!(key = %key, compacted = head.len(), "conversation compacted");
    }

    async fn summarize(&self, head: &[Message]) -> Result<String, AgentError> {
        let mut transcript = String::new();
        for message in head {
            let speaker = match message.role {
                Role::User => "User",
                Role::Model => "Assistant",
            };
            transcript.push_str(&format!("{speaker}: {}\n", message.text));
        }

        let request = GenerationRequest {
            model: self.model.clone(),
            system_prompt: "Summarize this hockey-analytics conversation in 6-8 lines of plain \
                            text. Preserve every player name, team, season and the user's \
                            intents. No markdown."
                .to_string(),
            user_prompt: transcript,
            temperature: 0.2,
            max_tokens: 400,
            top_p: 0.9,
        };

        let completion = self
            .llm
            .generate(&request)
            .await
            .map_err(|e| AgentError::Summarization(e.to_string()))?;
        Ok(completion.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockBehavior, MockLlmClient, ProviderError};
    use crate::memory::store::MemoryConfig;

    async fn fill(store: &ConversationStore, key: &str, count: usize) {
        for i in 0..count {
            let role = if i % 2 == 0 { Role::User } else { Role::Model };
            store
                .append(key, role, &format!("Turn {i}. Montreal looked sharp {i}."))
                .await;
        }
    }

    #[test]
    fn test_last_sentence() {
        assert_eq!(last_sentence("One. Two. Three."), "Three");
        assert_eq!(last_sentence("No terminator here"), "No terminator here");
        assert_eq!(last_sentence("Question? Answer!"), "Answer");
    }

    #[test]
    fn test_naive_summary_caps_length() {
        let messages: Vec<Message> = (0..30)
            .map(|i| Message::user(format!("Sentence number {i} about {}.", "x".repeat(80))))
            .collect();
        let summary = naive_summary(&messages);
        assert!(summary.chars().count() <= 1000);
        assert!(summary.contains(" | "));
    }

    #[tokio::test]
    async fn test_compaction_25_messages_yields_9() {
        let store = ConversationStore::new(MemoryConfig {
            max_turns: 20,
            summary_compact_to: 8,
        });
        fill(&store, "u1:default", 25).await;
        assert_eq!(store.message_count("u1:default").await, 25);

        let compactor = Compactor::new(
            Arc::new(MockLlmClient::new().push(MockBehavior::Reply(
                "User tracked Montreal across several games.".to_string(),
            ))),
            "mock-model",
        );
        compactor.maybe_compact(&store, "u1:default").await;

        let messages = store.get_prior("u1:default").await;
        assert_eq!(messages.len(), 9);
        assert!(messages[0].text.starts_with("Conversation summary: "));
        assert_eq!(messages[0].role, Role::Model);
        // 尾部 8 条原样保留
        assert_eq!(messages.last().unwrap().text, "Turn 24. Montreal looked sharp 24.");
    }

    #[tokio::test]
    async fn test_compaction_noop_at_or_below_soft_cap() {
        let store = ConversationStore::new(MemoryConfig {
            max_turns: 20,
            summary_compact_to: 8,
        });
        fill(&store, "u1:default", 20).await;

        let compactor = Compactor::new(Arc::new(MockLlmClient::new()), "mock-model");
        compactor.maybe_compact(&store, "u1:default").await;
        assert_eq!(store.message_count("u1:default").await, 20);
    }

    #[tokio::test]
    async fn test_compaction_idempotent() {
        let store = ConversationStore::new(MemoryConfig {
            max_turns: 20,
            summary_compact_to: 8,
        });
        fill(&store, "u1:default", 25).await;

        let compactor = Compactor::new(
            Arc::new(
                MockLlmClient::new()
                    .with_default(MockBehavior::Reply("summary text".to_string())),
            ),
            "mock-model",
        );
        compactor.maybe_compact(&store, "u1:default").await;
        let after_first = store.get_prior("u1:default").await;

        compactor.maybe_compact(&store, "u1:default").await;
        let after_second = store.get_prior("u1:default").await;

        assert_eq!(after_first.len(), after_second.len());
        assert_eq!(after_first[0].text, after_second[0].text);
    }

    #[tokio::test]
    async fn test_model_failure_falls_back_to_naive() {
        let store = ConversationStore::new(MemoryConfig {
            max_turns: 20,
            summary_compact_to: 8,
        });
        fill(&store, "u1:default", 25).await;

        let compactor = Compactor::new(
            Arc::new(MockLlmClient::new().with_default(MockBehavior::Fail(
                ProviderError::Upstream("503".to_string()),
            ))),
            "mock-model",
        );
        compactor.maybe_compact(&store, "u1:default").await;

        let messages = store.get_prior("u1:default").await;
        assert_eq!(messages.len(), 9);
        assert!(messages[0].text.starts_with("Conversation summary: "));
        assert!(messages[0].text.contains(" | "));
    }
}
