//! 会话存储：进程内键值线程表
//!
//! 注入式句柄（Arc<ConversationStore>），显式传给 Coordinator 与表面层，不做进程级单例。
//! 同一线程键的并发写采用 last-writer-wins；append 后硬剪枝到 2 × max_turns，
//! 剪枝与压缩逻辑对重复调用幂等。只有显式 delete 会删除线程。

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::memory::thread::{thread_key, ConversationSummary, ConversationThread, Message, Role};

/// 记忆参数
#[derive(Debug, Clone, Copy)]
pub struct MemoryConfig {
    /// 软上限：超过后触发压缩
    pub max_turns: usize,
    /// 压缩后保留的尾部消息数
    pub summary_compact_to: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_turns: 20,
            summary_compact_to: 8,
        }
    }
}

/// 进程内会话存储
pub struct ConversationStore {
    threads: RwLock<HashMap<String, ConversationThread>>,
    config: MemoryConfig,
}

impl ConversationStore {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            threads: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> MemoryConfig {
        self.config
    }

    /// 追加一条消息：空文本为 no-op；追加后硬剪枝到 2 × max_turns（丢最旧）
    pub async fn append(&self, key: &str, role: Role, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        let mut threads = self.threads.write().await;
        let thread = threads.entry(key.to_string()).or_default();
        thread.messages.push(Message {
            role,
            text: text.to_string(),
        });
        let hard_cap = self.config.max_turns * 2;
        if thread.messages.len() > hard_cap {
            let overflow = thread.messages.len() - hard_cap;
            thread.messages.drain(..overflow);
        }
        thread.updated_at = Some(Utc::now());
    }

    pub async fn get_prior(&self, key: &str) -> Vec<Message> {
        self.threads
            .read()
            .await
            .get(key)
            .map(|t| t.messages.clone())
            .unwrap_or_default()
    }

    pub async fn message_count(&self, key: &str) -> usize {
        self.threads
            .read()
            .await
            .get(key)
            .map(|t| t.messages.len())
            .unwrap_or(0)
    }

    /// 是否超过软上限（需要压缩）
    pub async fn needs_compaction(&self, key: &str) -> bool {
        self.message_count(key).await > self.config.max_turns
    }

    /// 压缩快照：消息数 > max_turns 时返回整个消息列表
    pub(crate) async fn compaction_snapshot(&self, key: &str) -> Option<Vec<Message>> {
        let threads = self.threads.read().await;
        let thread = threads.get(key)?;
        if thread.messages.len() <= self.config.max_turns {
            return None;
        }
        Some(thread.messages.clone())
    }

    /// 应用压缩：写锁下复查阈值（幂等 / 与并发 append 容错），
    /// 把头部替换为一条合成摘要消息，保留最近 summary_compact_to 条。
    pub(crate) async fn apply_compaction(&self, key: &str, summary_text: &str) {
        let mut threads = self.threads.write().await;
        let Some(thread) = threads.get_mut(key) else {
            return;
        };
        if thread.messages.len() <= self.config.max_turns {
            return;
        }
        let keep = self.config.summary_compact_to.min(thread.messages.len());
        let tail = thread.messages.split_off(thread.messages.len() - keep);
        thread.messages = std::iter::once(Message::model(summary_text.to_string()))
            .chain(tail)
            .collect();
    }

    /// 该用户的全部会话，按 updated_at 倒序；绝不包含其他用户的线程
    pub async fn list(&self, user_id: &str) -> Vec<ConversationSummary> {
        let prefix = format!("{user_id}:");
        let threads = self.threads.read().await;
        let mut rows: Vec<ConversationSummary> = threads
            .iter()
            .filter_map(|(key, thread)| {
                let conversation_id = key.strip_prefix(&prefix)?;
                Some(ConversationSummary {
                    conversation_id: conversation_id.to_string(),
                    updated_at: thread.updated_at,
                    title: thread_title(conversation_id, thread),
                    message_count: thread.messages.len(),
                })
            })
            .collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        rows
    }

    /// 新建会话，返回 conversation_id
    pub async fn start(&self, user_id: &str) -> String {
        let conversation_id = uuid::Uuid::new_v4().to_string();
        let key = thread_key(user_id, Some(&conversation_id));
        let mut threads = self.threads.write().await;
        threads.insert(
            key,
            ConversationThread {
                updated_at: Some(Utc::now()),
                ..Default::default()
            },
        );
        conversation_id
    }

    pub async fn rename(&self, user_id: &str, conversation_id: &str, title: &str) -> bool {
        let key = thread_key(user_id, Some(conversation_id));
        let mut threads = self.threads.write().await;
        match threads.get_mut(&key) {
            Some(thread) => {
                thread.title = Some(title.to_string());
                true
            }
            None => false,
        }
    }

    pub async fn delete(&self, user_id: &str, conversation_id: &str) -> bool {
        let key = thread_key(user_id, Some(conversation_id));
        self.threads.write().await.remove(&key).is_some()
    }

    /// 合并实体映射（同名键以新值为准）
    pub async fn merge_entities(&self, key: &str, entities: HashMap<String, String>) {
        if entities.is_empty() {
            return;
        }
        let mut threads = self.threads.write().await;
        let thread = threads.entry(key.to_string()).or_default();
        thread.last_entities.extend(entities);
    }

    pub async fn entities(&self, key: &str) -> HashMap<String, String> {
        self.threads
            .read()
            .await
            .get(key)
            .map(|t| t.last_entities.clone())
            .unwrap_or_default()
    }
}

/// 标题链：自定义标题 > 首条用户消息截断 80 字符 > 生成占位
fn thread_title(conversation_id: &str, thread: &ConversationThread) -> String {
    if let Some(ref title) = thread.title {
        return title.clone();
    }
    if let Some(first_user) = thread.messages.iter().find(|m| m.role == Role::User) {
        let mut title: String = first_user.text.chars().take(80).collect();
        if first_user.text.chars().count() > 80 {
            title.push_str("...");
        }
        return title;
    }
    let short: String = conversation_id.chars().take(8).collect();
    format!("Conversation {short}")
}
