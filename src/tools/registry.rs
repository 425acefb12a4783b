//! 工具注册表
//!
//! 所有工具实现 Tool trait（kind / description / run），由 ToolRegistry 按 ToolKind 注册与查找；
//! ToolDispatcher 在调用时加超时并统一封装为 ToolResult 信封。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::engine::RunState;
use crate::tools::{ToolKind, ToolOutput};

/// 工具 trait：标识、描述（供 LLM 选择）、异步执行（args 为 JSON，run 提供用户上下文）
#[async_trait]
pub trait Tool: Send + Sync {
    fn kind(&self) -> ToolKind;

    /// 工具描述（进入规划提示词的 Available tools 段落）
    fn description(&self) -> &str;

    async fn run(&self, args: &Value, run: &RunState) -> Result<ToolOutput, String>;
}

/// 工具注册表：按 ToolKind 存储 Arc<dyn Tool>
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<ToolKind, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.kind(), Arc::new(tool));
    }

    pub fn get(&self, kind: ToolKind) -> Option<Arc<dyn Tool>> {
        self.tools.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<ToolKind> {
        let mut kinds: Vec<ToolKind> = self.tools.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    /// 返回 (name, description) 列表（按名称排序，保证提示词稳定）
    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        let mut rows: Vec<(String, String)> = self
            .tools
            .iter()
            .map(|(kind, tool)| (kind.as_str().to_string(), tool.description().to_string()))
            .collect();
        rows.sort();
        rows
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
