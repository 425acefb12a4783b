//! Planner：下一个工具的选择与严格 JSON 协议
//!
//! 每轮问模型「下一个要调用的工具与参数」，要求单个 JSON 对象
//! {"next_tool": string|null, "args": object}；先剥掉 Markdown 代码栅栏再解析。
//! 解析失败恰好重试一次（更严格指令 + 温度 0），两次都失败则按模型主动停止处理
//! （fail-open：畸形规划输出绝不让请求失败）。"" / "none" / "null" 一律视为 null。

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::RunState;
use crate::error::AgentError;
use crate::llm::{
    GenerationRequest, LlmClient, PLANNER_MAX_TOKENS, PLANNER_STRICT_TEMPERATURE,
    PLANNER_TEMPERATURE,
};
use crate::tools::ToolCall;

/// 模型回复的规划结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedCall {
    #[serde(default)]
    pub next_tool: Option<String>,
    #[serde(default = "empty_args")]
    pub args: Value,
}

fn empty_args() -> Value {
    Value::Object(serde_json::Map::new())
}

/// 从文本中取出 JSON 块（```json ... ``` 或首个大括号对）
pub fn extract_json_block(output: &str) -> &str {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return rest
            .find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim());
    }
    if let Some(start) = trimmed.find("```") {
        let rest = &trimmed[start + 3..];
        return rest
            .find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim());
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            return &trimmed[start..=end];
        }
    }
    trimmed
}

/// 解析规划回复；非法 JSON 返回 PlanParse
pub fn parse_planned_call(output: &str) -> Result<PlannedCall, AgentError> {
    let json_str = extract_json_block(output);
    serde_json::from_str(json_str)
        .map_err(|e| AgentError::PlanParse(format!("{e}: {json_str}")))
}

/// "" / "none" / "null"（不区分大小写）等价于不调用工具
fn is_no_tool(name: &str) -> bool {
    let lower = name.trim().to_lowercase();
    lower.is_empty() || lower == "none" || lower == "null"
}

/// Planner：持有 LLM，按轮次构造提示词并解析下一步
pub struct Planner {
    llm: Arc<dyn LlmClient>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 规划下一个工具调用；None 表示模型选择（或被判定为）停止
    pub async fn plan_next(
        &self,
        run: &RunState,
        tool_descriptions: &[(String, String)],
        entities: &HashMap<String, String>,
        model: &str,
    ) -> Option<ToolCall> {
        let system = self.system_prompt(tool_descriptions, entities);
        let user = self.user_prompt(run);

        let first = self
            .llm
            .generate(&GenerationRequest {
                model: model.to_string(),
                system_prompt: system.clone(),
                user_prompt: user.clone(),
                temperature: PLANNER_TEMPERATURE,
                max_tokens: PLANNER_MAX_TOKENS,
                top_p: 0.9,
            })
            .await;

        let first_text = match first {
            Ok(completion) => completion.text,
            Err(e) => {
                tracing::warn!(error = %e, "planner call failed, stopping planning");
                return None;
            }
        };

        match parse_planned_call(&first_text) {
            Ok(planned) => return to_tool_call(planned),
            Err(e) => {
                tracing::debug!(error = %e, "planner reply not valid JSON, retrying strict");
            }
        }

        // 严格重试：温度 0，指令只许输出一行 JSON
        let strict_user = format!(
            "{user}\n\nYour previous reply was not valid JSON. Respond with exactly one JSON \
             object of the form {{\"next_tool\": \"<tool name>\" | null, \"args\": {{}}}} and \
             nothing else - no prose, no markdown."
        );
        let second = self
            .llm
            .generate(&GenerationRequest {
                model: model.to_string(),
                system_prompt: system,
                user_prompt: strict_user,
                temperature: PLANNER_STRICT_TEMPERATURE,
                max_tokens: PLANNER_MAX_TOKENS,
                top_p: 0.9,
            })
            .await;

        match second {
            Ok(completion) => match parse_planned_call(&completion.text) {
                Ok(planned) => to_tool_call(planned),
                Err(e) => {
                    tracing::warn!(error = %e, "planner reply unparseable twice, treating as stop");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "planner strict retry failed, stopping planning");
                None
            }
        }
    }

    fn system_prompt(
        &self,
        tool_descriptions: &[(String, String)],
        entities: &HashMap<String, String>,
    ) -> String {
        let mut tools_block = String::new();
        for (name, description) in tool_descriptions {
            tools_block.push_str(&format!("- {name}: {description}\n"));
        }

        let mut entities_block = String::new();
        if !entities.is_empty() {
            let mut pairs: Vec<String> = entities
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            pairs.sort();
            entities_block = format!(
                "\nKnown context from earlier turns (use it to resolve pronouns like \
                 \"their\" or \"his\"): {}.\n",
                pairs.join(", ")
            );
        }

        format!(
            "You are the planning step of a hockey analytics assistant. Decide the next tool \
             to call, if any, to gather the data needed to answer the user's question.\n\n\
             Available tools:\n{tools_block}\n\
             Selection heuristics:\n\
             - Roster or lineup questions -> get_team_roster.\n\
             - Scores, schedules, \"tonight\", \"last night\" -> get_live_schedule.\n\
             - Statistical comparisons or aggregates -> analytics_query.\n\
             - Salary, contract or trade value -> get_market_data.\n\
             - Highlight or shift video -> get_video_clips.\n\
             - Prefer one precise call over several broad ones.\n\
             - If the gathered data already answers the question, or no tool applies, stop.\n\
             {entities_block}\n\
             Reply with exactly one JSON object: {{\"next_tool\": \"<tool name>\" | null, \
             \"args\": {{...}}}}. Use null to stop."
        )
    }

    /// 用户侧提示词：原始问题 + 已收集数据的简报（绝不内联原始负载，控制提示词体积）
    fn user_prompt(&self, run: &RunState) -> String {
        let mut gathered = String::new();
        if run.tool_results.is_empty() {
            gathered.push_str("(no data gathered yet)");
        } else {
            for result in &run.tool_results {
                if result.success {
                    let size_hint = match &result.data {
                        Some(Value::Object(map)) => format!("{} fields", map.len()),
                        Some(Value::Array(items)) => format!("{} items", items.len()),
                        _ => "ok".to_string(),
                    };
                    gathered.push_str(&format!("- {}: ok ({size_hint})\n", result.tool_type));
                } else {
                    let reason: String = result
                        .error
                        .as_deref()
                        .unwrap_or("unknown error")
                        .chars()
                        .take(120)
                        .collect();
                    gathered.push_str(&format!("- {}: failed ({reason})\n", result.tool_type));
                }
            }
        }

        format!(
            "Question: {}\n\nData gathered so far:\n{}",
            run.original_query, gathered
        )
    }
}

fn to_tool_call(planned: PlannedCall) -> Option<ToolCall> {
    match planned.next_tool {
        Some(name) if !is_no_tool(&name) => Some(ToolCall {
            tool: name.trim().to_string(),
            args: planned.args,
        }),
        _ => None,
    }
}
