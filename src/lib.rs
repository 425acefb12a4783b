//! Rinkside - 冰球分析对话智能体
//!
//! 模块划分：
//! - **agent**: 无头运行时（process_query 入口与会话管理表面）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **engine**: 编排循环（Planner / Coordinator / Synthesizer / 研究分支）
//! - **error**: 错误分类（每个恢复点一个变体）
//! - **llm**: Provider 适配（OpenAI 兼容 / Mock）、限速重试、生成模式注册表
//! - **memory**: 会话记忆（线程存储、硬剪枝、压缩、实体追踪）
//! - **tools**: 工具注册表、统一信封与派发器（roster / schedule 内置）

pub mod agent;
pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod memory;
pub mod tools;

pub use agent::{create_agent_components, process_query, AgentComponents, QueryResponse};
pub use error::AgentError;
