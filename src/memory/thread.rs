//! 会话消息与线程类型
//!
//! 线程按 "{user_id}:{conversation_id|default}" 键入；每条消息只有角色与文本。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 消息角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// 一个用户+会话对的完整线程状态
#[derive(Clone, Debug, Default)]
pub struct ConversationThread {
    pub messages: Vec<Message>,
    /// 最近提到的实体（player / team 等），供代词消解
    pub last_entities: HashMap<String, String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub title: Option<String>,
}

/// 线程键："{user_id}:{conversation_id|default}"
pub fn thread_key(user_id: &str, conversation_id: Option<&str>) -> String {
    match conversation_id {
        Some(id) if !id.trim().is_empty() => format!("{user_id}:{}", id.trim()),
        _ => format!("{user_id}:default"),
    }
}

/// list_conversations 的行
#[derive(Clone, Debug, Serialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub title: String,
    pub message_count: usize,
}
