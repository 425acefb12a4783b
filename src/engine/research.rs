//! 深度研究分支
//!
//! report 模式下与主工具循环并行的一次独立模型调用，产出小型结构化研究简报；
//! 由 Coordinator 在合成前带墙钟超时 join，超时或失败都静默容忍（仅 debug 日志）。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::planner::extract_json_block;
use crate::error::AgentError;
use crate::llm::{GenerationRequest, LlmClient};

/// 研究简报：报告可以覆盖的角度与关键问题
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchBrief {
    #[serde(default)]
    pub angles: Vec<String>,
    #[serde(default)]
    pub key_questions: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

/// 独立调用模型生成研究简报（与主循环互不依赖）
pub async fn research_brief(
    llm: Arc<dyn LlmClient>,
    query: String,
    model: String,
) -> Result<ResearchBrief, AgentError> {
    let request = GenerationRequest {
        model,
        system_prompt: "You prepare a compact research brief for a hockey analytics deep \
                        report. Reply with exactly one JSON object: {\"angles\": [..], \
                        \"key_questions\": [..], \"summary\": \"..\"}. Keep it under 8 items \
                        total."
            .to_string(),
        user_prompt: format!("Report topic: {query}"),
        temperature: 0.4,
        max_tokens: 500,
        top_p: 0.9,
    };

    let completion = llm.generate(&request).await?;
    let json_str = extract_json_block(&completion.text);
    serde_json::from_str(json_str)
        .map_err(|e| AgentError::PlanParse(format!("research brief: {e}")))
}
