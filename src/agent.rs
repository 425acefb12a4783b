//! Headless Agent 运行时
//!
//! 供 HTTP 层等前端调用的无界面入口：create_agent_components 构建
//! Provider 栈 / 派发器 / 会话存储 / 压缩器，process_query 对单条查询跑编排循环并
//! 返回结构化响应：循环内的任何失败都降级为 success:false + errors[]，绝不向外抛错。
//! 会话管理表面（list / start / rename / delete）直接委托给存储。

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::engine::{Coordinator, EngineConfig, Query, UserContext, FALLBACK_RESPONSE};
use crate::llm::{
    create_rate_limiter, fast_model, resolve_profile, LlmClient, MockLlmClient, OpenAiProvider,
    RetryingLlmClient,
};
use crate::memory::{
    extract_entities, thread_key, Compactor, ConversationStore, ConversationSummary, Message,
    Role,
};
use crate::tools::{LiveScheduleTool, TeamRosterTool, ToolDispatcher, ToolRegistry, ToolResult};

/// 预构建的组件：Provider、派发器、会话存储、压缩器，可多请求共享
pub struct AgentComponents {
    pub llm: Arc<dyn LlmClient>,
    pub dispatcher: Arc<ToolDispatcher>,
    pub store: Arc<ConversationStore>,
    pub compactor: Arc<Compactor>,
    pub engine: EngineConfig,
}

/// 根据环境变量选择 Provider：有 OPENAI_API_KEY 走真实端点，否则退回 Mock
fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let base: Arc<dyn LlmClient> = if std::env::var("OPENAI_API_KEY").is_ok() {
        tracing::info!("Using OpenAI-compatible provider");
        Arc::new(OpenAiProvider::new(
            cfg.llm.base_url.as_deref(),
            None,
            cfg.llm.request_timeout_secs,
        ))
    } else {
        tracing::warn!("No API key set, using Mock LLM");
        Arc::new(MockLlmClient::new())
    };

    let limiter = create_rate_limiter(cfg.llm.rate_limit_rps);
    Arc::new(RetryingLlmClient::new(base, cfg.llm.retry.clone()).with_rate_limiter(limiter))
}

/// 创建组件：限速重试 Provider + 内置数据工具 + 会话存储 + 压缩器
pub fn create_agent_components(cfg: &AppConfig) -> AgentComponents {
    let llm = create_llm_from_config(cfg);

    let mut tools = ToolRegistry::new();
    tools.register(TeamRosterTool::new(
        &cfg.tools.stats_base_url,
        cfg.tools.tool_timeout_secs,
    ));
    tools.register(LiveScheduleTool::new(
        &cfg.tools.stats_base_url,
        cfg.tools.tool_timeout_secs,
    ));

    let dispatcher = Arc::new(ToolDispatcher::new(
        tools,
        std::time::Duration::from_secs(cfg.tools.tool_timeout_secs),
    ));
    let store = Arc::new(ConversationStore::new(cfg.app.memory_config()));
    let compactor = Arc::new(Compactor::new(llm.clone(), fast_model()));

    AgentComponents {
        llm,
        dispatcher,
        store,
        compactor,
        engine: cfg.engine.clone(),
    }
}

/// process_query 的结构化响应
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub success: bool,
    pub response: String,
    pub query_type: String,
    pub tool_results: Vec<ToolResult>,
    pub processing_time_ms: u64,
    pub evidence: Vec<String>,
    pub analytics: Vec<Value>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl QueryResponse {
    fn rejected(reason: String, elapsed_ms: u64) -> Self {
        Self {
            success: false,
            response: "I'm sorry - I can't process that request as submitted.".to_string(),
            query_type: "rejected".to_string(),
            tool_results: Vec::new(),
            processing_time_ms: elapsed_ms,
            evidence: Vec::new(),
            analytics: Vec::new(),
            errors: vec![reason],
            warnings: Vec::new(),
        }
    }
}

/// 去重保序的引用来源合集
fn collect_evidence(results: &[ToolResult]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut evidence = Vec::new();
    for result in results {
        for citation in &result.citations {
            if seen.insert(citation.clone()) {
                evidence.push(citation.clone());
            }
        }
    }
    evidence
}

/// 分析类负载：成功的 analytics_query / generate_viz_spec 结果数据
fn collect_analytics(results: &[ToolResult]) -> Vec<Value> {
    results
        .iter()
        .filter(|r| {
            r.success
                && matches!(r.tool_type.as_str(), "analytics_query" | "generate_viz_spec")
        })
        .filter_map(|r| r.data.clone())
        .collect()
}

/// 处理单条查询（无取消令牌版本）
pub async fn process_query(
    components: &AgentComponents,
    query: Query,
    user_context: &UserContext,
) -> QueryResponse {
    process_query_with_cancel(components, query, user_context, CancellationToken::new()).await
}

/// 处理单条查询：编排循环 -> 写回会话记忆 -> 异步压缩 -> 结构化响应。
/// 任何失败模式都体现在 success/errors 字段上，不会抛错。
pub async fn process_query_with_cancel(
    components: &AgentComponents,
    query: Query,
    user_context: &UserContext,
    cancel_token: CancellationToken,
) -> QueryResponse {
    let start = Instant::now();
    let elapsed = |s: Instant| s.elapsed().as_millis() as u64;

    let text = query.text.trim().to_string();
    if text.is_empty() {
        return QueryResponse::rejected("empty query".to_string(), elapsed(start));
    }

    let profile = match resolve_profile(query.mode.as_deref(), query.model.as_deref()) {
        Ok(profile) => profile,
        Err(e) => return QueryResponse::rejected(e.to_string(), elapsed(start)),
    };

    let key = thread_key(&user_context.user_id, query.conversation_id.as_deref());
    let prior = components.store.get_prior(&key).await;
    let entities = components.store.entities(&key).await;

    let coordinator = Coordinator::new(
        components.llm.clone(),
        components.dispatcher.clone(),
        components.engine.clone(),
    );
    let run = coordinator
        .run(
            &text,
            user_context.clone(),
            &prior,
            &entities,
            &profile,
            cancel_token.clone(),
        )
        .await;

    // 取消的请求不写入会话记忆（无部分持久化）
    if cancel_token.is_cancelled() {
        let mut response = QueryResponse::rejected("request cancelled".to_string(), elapsed(start));
        response.warnings = run.warnings;
        return response;
    }

    let answer = run
        .final_response
        .clone()
        .unwrap_or_else(|| FALLBACK_RESPONSE.to_string());

    components.store.append(&key, Role::User, &text).await;
    components.store.append(&key, Role::Model, &answer).await;

    let extracted = extract_entities(&text, &run.tool_results);
    components.store.merge_entities(&key, extracted).await;

    // 超过软上限时异步压缩，不阻塞响应
    if components.store.needs_compaction(&key).await {
        let store = components.store.clone();
        let compactor = components.compactor.clone();
        let key = key.clone();
        tokio::spawn(async move {
            compactor.maybe_compact(&store, &key).await;
        });
    }

    QueryResponse {
        success: run.errors.is_empty(),
        response: answer,
        query_type: profile.name.clone(),
        evidence: collect_evidence(&run.tool_results),
        analytics: collect_analytics(&run.tool_results),
        tool_results: run.tool_results,
        processing_time_ms: elapsed(start),
        errors: run.errors,
        warnings: run.warnings,
    }
}

impl AgentComponents {
    pub async fn list_conversations(&self, user_id: &str) -> Vec<ConversationSummary> {
        self.store.list(user_id).await
    }

    pub async fn get_conversation(&self, user_id: &str, conversation_id: &str) -> Vec<Message> {
        let key = thread_key(user_id, Some(conversation_id));
        self.store.get_prior(&key).await
    }

    pub async fn start_conversation(&self, user_id: &str) -> String {
        self.store.start(user_id).await
    }

    pub async fn rename_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
        title: &str,
    ) -> bool {
        self.store.rename(user_id, conversation_id, title).await
    }

    pub async fn delete_conversation(&self, user_id: &str, conversation_id: &str) -> bool {
        self.store.delete(user_id, conversation_id).await
    }
}
