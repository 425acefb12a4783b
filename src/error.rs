//! 错误分类（AgentError taxonomy，spec §7）
//!
//! 每个恢复点一个变体；编排层以此区分可恢复/不可恢复路径。
//! 底层 Provider 错误经 `Provider` 变体上浮。

use thiserror::Error;

use crate::llm::ProviderError;

/// 智能体顶层错误；映射 spec §7 的恢复点。
#[derive(Error, Debug)]
pub enum AgentError {
    /// 规划回复无法解析为合法的工具调用 JSON。
    #[error("plan parse error: {0}")]
    PlanParse(String),

    /// 工具执行失败（未知工具 / 工具内部错误 / 超时）。
    #[error("tool execution error: {0}")]
    ToolExecution(String),

    /// Provider 层错误上浮。
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// 综合（Synthesizer）阶段失败。
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// 记忆压缩摘要失败。
    #[error("summarization error: {0}")]
    Summarization(String),

    /// 未知生成模式。
    #[error("unknown mode: {0}")]
    UnknownMode(String),

    /// 模型不在该模式允许列表内。
    #[error("model not allowed: {0}")]
    ModelNotAllowed(String),

    /// 配置加载/校验失败。
    #[error("config error: {0}")]
    Config(String),

    /// 操作被取消。
    #[error("cancelled")]
    Cancelled,
}
