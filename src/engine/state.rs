//! 请求级运行状态
//!
//! RunState 随请求创建、随响应销毁，从不持久化；每个 ToolResult 恰好属于一个 RunState。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::tools::ToolResult;

/// 调用方身份角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Coach,
    Player,
    Analyst,
    Staff,
    Scout,
}

/// 调用方上下文：身份、可见球队范围、自由偏好（如时区）；单次请求内不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub role: UserRole,
    #[serde(default)]
    pub team_scope: Vec<String>,
    #[serde(default)]
    pub preferences: HashMap<String, String>,
}

/// 一次查询的输入
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub text: String,
    pub mode: Option<String>,
    pub model: Option<String>,
    pub conversation_id: Option<String>,
}

/// 请求级累积器：原始查询、迭代计数、工具结果序列与最终回复
#[derive(Debug, Clone)]
pub struct RunState {
    pub original_query: String,
    pub user_context: UserContext,
    pub current_iteration: u32,
    pub tool_results: Vec<ToolResult>,
    pub final_response: Option<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl RunState {
    pub fn new(query: &str, user_context: UserContext) -> Self {
        Self {
            original_query: query.to_string(),
            user_context,
            current_iteration: 0,
            tool_results: Vec::new(),
            final_response: None,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn push_result(&mut self, result: ToolResult) {
        self.tool_results.push(result);
    }

    /// 充分性判定：存在至少一个成功且数据非空的工具结果。
    /// 这是刻意保留的粗粒度启发式：一次简单工具成功即停止规划。
    pub fn has_sufficient_data(&self) -> bool {
        self.tool_results.iter().any(|r| r.has_data())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolOutput, ToolResult};
    use serde_json::json;

    fn ctx() -> UserContext {
        UserContext {
            user_id: "u1".to_string(),
            role: UserRole::Coach,
            team_scope: vec!["MTL".to_string()],
            preferences: HashMap::new(),
        }
    }

    #[test]
    fn test_sufficiency_requires_non_empty_success() {
        let mut run = RunState::new("q", ctx());
        assert!(!run.has_sufficient_data());

        run.push_result(ToolResult::failure("get_team_roster", "boom", 5));
        assert!(!run.has_sufficient_data());

        run.push_result(ToolResult::ok(
            "get_team_roster",
            ToolOutput::new(json!({})),
            5,
        ));
        assert!(!run.has_sufficient_data());

        run.push_result(ToolResult::ok(
            "get_team_roster",
            ToolOutput::new(json!({"players": [1]})),
            5,
        ));
        assert!(run.has_sufficient_data());
    }
}
