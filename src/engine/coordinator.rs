//! 编排循环（Coordinator）
//!
//! 状态机 Planning -> Executing -> Checking -> (Planning | Synthesizing) -> Done。
//! 硬迭代上限是除模型主动停止外唯一的终止保证；充分性判定见 RunState::has_sufficient_data。
//! report 模式在循环入口并行启动研究简报任务，合成前带墙钟超时 join，
//! 超时或失败不阻塞响应（简报只是可选增强）。取消令牌在阶段之间检查。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::engine::planner::Planner;
use crate::engine::research::{research_brief, ResearchBrief};
use crate::engine::synthesizer::Synthesizer;
use crate::engine::{RunState, UserContext};
use crate::llm::{fast_model, LlmClient, ResolvedProfile};
use crate::memory::Message;
use crate::tools::{ToolCall, ToolDispatcher};

/// 循环参数
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// 硬迭代上限（工具派发次数）
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_research_timeout_secs")]
    pub research_timeout_secs: u64,
}

fn default_max_iterations() -> u32 {
    5
}
fn default_research_timeout_secs() -> u64 {
    25
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            research_timeout_secs: default_research_timeout_secs(),
        }
    }
}

/// 循环阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Planning,
    Executing,
    Checking,
    Synthesizing,
}

/// Coordinator：驱动 Planner -> Dispatcher -> 充分性判定 -> Synthesizer
pub struct Coordinator {
    llm: Arc<dyn LlmClient>,
    planner: Planner,
    synthesizer: Synthesizer,
    dispatcher: Arc<ToolDispatcher>,
    config: EngineConfig,
}

impl Coordinator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        dispatcher: Arc<ToolDispatcher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            planner: Planner::new(llm.clone()),
            synthesizer: Synthesizer::new(llm.clone()),
            llm,
            dispatcher,
            config,
        }
    }

    /// 处理一次查询：返回带 final_response 的 RunState。
    /// 取消时提前返回（final_response 为 None），调用方不得把该轮写入会话记忆。
    pub async fn run(
        &self,
        query: &str,
        user_context: UserContext,
        conversation_tail: &[Message],
        entities: &HashMap<String, String>,
        profile: &ResolvedProfile,
        cancel_token: CancellationToken,
    ) -> RunState {
        let mut run = RunState::new(query, user_context);

        // 深度研究分支：fire-and-forget 启动，合成前 join
        let mut research_handle = if profile.deep_report {
            Some(tokio::spawn(research_brief(
                self.llm.clone(),
                query.to_string(),
                fast_model().to_string(),
            )))
        } else {
            None
        };

        let tool_descriptions = self.dispatcher.registry().tool_descriptions();
        let mut phase = Phase::Planning;
        let mut pending_call: Option<ToolCall> = None;

        loop {
            if cancel_token.is_cancelled() {
                tracing::info!("run cancelled, aborting before completion");
                run.warnings.push("request cancelled".to_string());
                return run;
            }

            match phase {
                Phase::Planning => {
                    if run.current_iteration >= self.config.max_iterations {
                        phase = Phase::Synthesizing;
                        continue;
                    }
                    tracing::debug!(iteration = run.current_iteration, "phase: planning");
                    match self
                        .planner
                        .plan_next(&run, &tool_descriptions, entities, &profile.model)
                        .await
                    {
                        Some(call) => {
                            pending_call = Some(call);
                            phase = Phase::Executing;
                        }
                        None => phase = Phase::Synthesizing,
                    }
                }
                Phase::Executing => {
                    let Some(call) = pending_call.take() else {
                        phase = Phase::Synthesizing;
                        continue;
                    };
                    tracing::debug!(tool = %call.tool, "phase: executing");
                    let result = self.dispatcher.execute(&call.tool, call.args, &run).await;
                    run.push_result(result);
                    run.current_iteration += 1;
                    phase = Phase::Checking;
                }
                Phase::Checking => {
                    phase = if run.has_sufficient_data()
                        || run.current_iteration >= self.config.max_iterations
                    {
                        Phase::Synthesizing
                    } else {
                        Phase::Planning
                    };
                }
                Phase::Synthesizing => {
                    let brief = self.join_research(research_handle.take()).await;
                    tracing::debug!(
                        results = run.tool_results.len(),
                        with_brief = brief.is_some(),
                        "phase: synthesizing"
                    );
                    let text = self
                        .synthesizer
                        .synthesize(
                            &mut run,
                            conversation_tail,
                            entities,
                            brief.as_ref(),
                            profile,
                        )
                        .await;
                    run.final_response = Some(text);
                    return run;
                }
            }
        }
    }

    /// join 研究分支；超时或失败静默容忍（任务未被强制取消，结果被丢弃）
    async fn join_research(
        &self,
        handle: Option<tokio::task::JoinHandle<Result<ResearchBrief, crate::error::AgentError>>>,
    ) -> Option<ResearchBrief> {
        let handle = handle?;
        let timeout = Duration::from_secs(self.config.research_timeout_secs);
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(Ok(brief))) => Some(brief),
            Ok(Ok(Err(e))) => {
                tracing::debug!(error = %e, "research brief failed, continuing without it");
                None
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "research task join error, continuing without it");
                None
            }
            Err(_) => {
                tracing::debug!(
                    timeout_secs = self.config.research_timeout_secs,
                    "research brief timed out, continuing without it"
                );
                None
            }
        }
    }
}
