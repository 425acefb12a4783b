//! Synthesizer：把工具结果合成为最终回答
//!
//! 单次模型调用：提示词携带日期/赛季上下文、近几轮对话节选（逐条截断）、
//! 按工具类型格式化的结果（赛程压成对阵列表、阵容按位置分组，绝不直接倾倒原始 JSON）、
//! 可选研究简报与格式要求。Provider 失败时降级为固定致歉文案，绝不抛错。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, Utc};
use serde_json::Value;

use crate::engine::research::ResearchBrief;
use crate::engine::RunState;
use crate::llm::{GenerationRequest, LlmClient, ResolvedProfile};
use crate::memory::{Message, Role};

/// 合成失败时的用户可见兜底文案
pub const FALLBACK_RESPONSE: &str = "I'm sorry - I couldn't put together an answer for that \
                                     one. Please try again in a moment.";

/// 对话节选：最近几条，逐条截断
const TAIL_MESSAGES: usize = 4;
const TAIL_MESSAGE_CHARS: usize = 300;

/// NHL 赛季跨年：7 月起算新赛季标签（如 2025-26）
fn season_label(now: chrono::DateTime<Utc>) -> String {
    let year = now.year();
    if now.month() >= 7 {
        format!("{}-{:02}", year, (year + 1) % 100)
    } else {
        format!("{}-{:02}", year - 1, year % 100)
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{cut}...")
    }
}

/// 近几轮对话节选
fn tail_excerpt(tail: &[Message]) -> String {
    if tail.is_empty() {
        return String::new();
    }
    let start = tail.len().saturating_sub(TAIL_MESSAGES);
    let mut out = String::from("Recent conversation:\n");
    for message in &tail[start..] {
        let speaker = match message.role {
            Role::User => "User",
            Role::Model => "Assistant",
        };
        out.push_str(&format!(
            "{speaker}: {}\n",
            truncate_chars(&message.text, TAIL_MESSAGE_CHARS)
        ));
    }
    out
}

/// 单个成功结果按工具类型渲染为紧凑文本
fn format_result_data(tool_type: &str, data: &Value) -> String {
    match tool_type {
        "get_live_schedule" => {
            let Some(games) = data.get("games").and_then(|v| v.as_array()) else {
                return compact_json(data);
            };
            let mut lines = Vec::new();
            for game in games.iter().take(10) {
                let away = game.get("away").and_then(|v| v.as_str()).unwrap_or("?");
                let home = game.get("home").and_then(|v| v.as_str()).unwrap_or("?");
                let state = game.get("state").and_then(|v| v.as_str()).unwrap_or("FUT");
                match game.get("score").and_then(|v| v.as_str()) {
                    Some(score) => lines.push(format!("{away} @ {home} - {state} {score}")),
                    None => {
                        let start = game.get("start").and_then(|v| v.as_str()).unwrap_or("TBD");
                        lines.push(format!("{away} @ {home} - {state}, starts {start}"));
                    }
                }
            }
            if games.len() > 10 {
                lines.push(format!("(and {} more games)", games.len() - 10));
            }
            lines.join("\n")
        }
        "get_team_roster" => {
            let Some(players) = data.get("players").and_then(|v| v.as_array()) else {
                return compact_json(data);
            };
            // 按位置分组：前锋 / 后卫 / 门将
            let mut groups: Vec<(&str, Vec<String>)> = vec![
                ("Forwards", Vec::new()),
                ("Defense", Vec::new()),
                ("Goalies", Vec::new()),
            ];
            for player in players {
                let name = player.get("name").and_then(|v| v.as_str()).unwrap_or("?");
                let position = player.get("position").and_then(|v| v.as_str()).unwrap_or("F");
                let entry = match player.get("number").and_then(|v| v.as_u64()) {
                    Some(number) => format!("#{number} {name}"),
                    None => name.to_string(),
                };
                let slot: usize = match position {
                    "D" => 1,
                    "G" => 2,
                    _ => 0,
                };
                groups[slot].1.push(entry);
            }
            let team = data.get("team").and_then(|v| v.as_str()).unwrap_or("");
            let mut out = format!("Roster {team}:\n");
            for (label, members) in groups {
                if !members.is_empty() {
                    out.push_str(&format!("{label}: {}\n", members.join(", ")));
                }
            }
            out
        }
        "get_video_clips" => {
            let Some(clips) = data.get("clips").and_then(|v| v.as_array()) else {
                return compact_json(data);
            };
            clips
                .iter()
                .take(8)
                .map(|clip| {
                    let title = clip.get("title").and_then(|v| v.as_str()).unwrap_or("clip");
                    match clip.get("url").and_then(|v| v.as_str()) {
                        Some(url) => format!("{title} ({url})"),
                        None => title.to_string(),
                    }
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        "analytics_query" | "get_market_data" => match data {
            Value::Object(map) => map
                .iter()
                .take(20)
                .map(|(k, v)| format!("{k}: {}", compact_json(v)))
                .collect::<Vec<_>>()
                .join("\n"),
            other => compact_json(other),
        },
        "semantic_search" => {
            let Some(hits) = data.get("hits").and_then(|v| v.as_array()) else {
                return compact_json(data);
            };
            hits.iter()
                .take(5)
                .filter_map(|hit| hit.get("text").and_then(|v| v.as_str()))
                .map(|text| truncate_chars(text, 200))
                .collect::<Vec<_>>()
                .join("\n")
        }
        _ => compact_json(data),
    }
}

fn compact_json(value: &Value) -> String {
    truncate_chars(&value.to_string(), 600)
}

/// 全部工具结果的汇总段落；失败结果压成单行说明
fn format_tool_results(run: &RunState) -> String {
    if run.tool_results.is_empty() {
        return "(no tool data was gathered for this question)".to_string();
    }
    let mut out = String::new();
    for result in &run.tool_results {
        if result.success {
            let body = result
                .data
                .as_ref()
                .map(|d| format_result_data(&result.tool_type, d))
                .unwrap_or_else(|| "(empty)".to_string());
            out.push_str(&format!("[{}]\n{}\n\n", result.tool_type, body));
        } else {
            out.push_str(&format!(
                "[{}] unavailable ({})\n\n",
                result.tool_type,
                result.error.as_deref().unwrap_or("unknown error")
            ));
        }
    }
    out.trim_end().to_string()
}

/// Synthesizer：持有 LLM，一次调用产出最终文本
pub struct Synthesizer {
    llm: Arc<dyn LlmClient>,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 合成最终回答；失败时写入 run.errors 并返回兜底文案
    pub async fn synthesize(
        &self,
        run: &mut RunState,
        tail: &[Message],
        entities: &HashMap<String, String>,
        brief: Option<&ResearchBrief>,
        profile: &ResolvedProfile,
    ) -> String {
        let now = Utc::now();
        let mut context_lines = format!(
            "Today is {} (NHL season {}).\n",
            now.format("%Y-%m-%d"),
            season_label(now)
        );
        if !entities.is_empty() {
            let mut pairs: Vec<String> =
                entities.iter().map(|(k, v)| format!("{k}={v}")).collect();
            pairs.sort();
            context_lines.push_str(&format!("Known entities: {}.\n", pairs.join(", ")));
        }

        let mut brief_block = String::new();
        if let Some(brief) = brief {
            brief_block = format!(
                "Research brief (optional enrichment):\nangles: {}\nkey questions: {}\n{}\n\n",
                brief.angles.join("; "),
                brief.key_questions.join("; "),
                brief.summary
            );
        }

        let user_prompt = format!(
            "{context_lines}\n{}\n{brief_block}Tool data:\n{}\n\nQuestion: {}\n\n\
             Write the final answer for the user.",
            tail_excerpt(tail),
            format_tool_results(run),
            run.original_query
        );

        let request = GenerationRequest {
            model: profile.model.clone(),
            system_prompt: "You are a hockey analytics assistant writing the final answer. \
                            Use only the tool data and conversation above. Plain text, no \
                            markdown tables. Cite concrete figures when present, and state \
                            clearly when the data is partial or a lookup failed."
                .to_string(),
            user_prompt,
            temperature: profile.temperature,
            max_tokens: profile.max_tokens,
            top_p: profile.top_p,
        };

        match self.llm.generate(&request).await {
            Ok(completion) if !completion.text.trim().is_empty() => {
                completion.text.trim().to_string()
            }
            Ok(_) => {
                run.errors.push("synthesis returned empty text".to_string());
                FALLBACK_RESPONSE.to_string()
            }
            Err(e) => {
                tracing::error!(error = %e, "synthesis failed, returning fallback");
                run.errors.push(format!("synthesis failed: {e}"));
                FALLBACK_RESPONSE.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{UserContext, UserRole};
    use crate::llm::{resolve_profile, MockBehavior, MockLlmClient, ProviderError};
    use crate::tools::{ToolOutput, ToolResult};
    use chrono::TimeZone;
    use serde_json::json;

    fn run_with_roster() -> RunState {
        let mut run = RunState::new(
            "What is Montreal's roster?",
            UserContext {
                user_id: "u1".to_string(),
                role: UserRole::Analyst,
                team_scope: vec![],
                preferences: Default::default(),
            },
        );
        run.push_result(ToolResult::ok(
            "get_team_roster",
            ToolOutput::new(json!({
                "team": "MTL",
                "players": [
                    {"name": "Nick Suzuki", "position": "C", "number": 14},
                    {"name": "Mike Matheson", "position": "D", "number": 8},
                    {"name": "Sam Montembeault", "position": "G", "number": 35}
                ]
            })),
            12,
        ));
        run
    }

    #[test]
    fn test_season_label_crosses_july() {
        let march = Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 0).unwrap();
        assert_eq!(season_label(march), "2025-26");
        let october = Utc.with_ymd_and_hms(2026, 10, 15, 0, 0, 0).unwrap();
        assert_eq!(season_label(october), "2026-27");
    }

    #[test]
    fn test_roster_grouped_by_position() {
        let run = run_with_roster();
        let formatted = format_tool_results(&run);
        assert!(formatted.contains("Forwards: #14 Nick Suzuki"));
        assert!(formatted.contains("Defense: #8 Mike Matheson"));
        assert!(formatted.contains("Goalies: #35 Sam Montembeault"));
    }

    #[test]
    fn test_schedule_rendered_as_matchup_lines() {
        let mut run = run_with_roster();
        run.tool_results.clear();
        run.push_result(ToolResult::ok(
            "get_live_schedule",
            ToolOutput::new(json!({"games": [
                {"away": "MTL", "home": "TOR", "state": "FINAL", "score": "3-2"},
                {"away": "BOS", "home": "MTL", "state": "FUT", "start": "2026-02-10T00:00:00Z"}
            ]})),
            9,
        ));
        let formatted = format_tool_results(&run);
        assert!(formatted.contains("MTL @ TOR - FINAL 3-2"));
        assert!(formatted.contains("BOS @ MTL - FUT, starts 2026-02-10T00:00:00Z"));
    }

    #[test]
    fn test_failed_results_become_one_liners() {
        let mut run = run_with_roster();
        run.tool_results.clear();
        run.push_result(ToolResult::failure("get_market_data", "HTTP 502", 30));
        let formatted = format_tool_results(&run);
        assert!(formatted.contains("[get_market_data] unavailable (HTTP 502)"));
    }

    #[tokio::test]
    async fn test_synthesize_returns_model_text() {
        let llm = Arc::new(MockLlmClient::new().push(MockBehavior::Reply(
            "Montreal dresses Suzuki at center.".to_string(),
        )));
        let synthesizer = Synthesizer::new(llm);
        let mut run = run_with_roster();
        let profile = resolve_profile(None, None).unwrap();
        let text = synthesizer
            .synthesize(&mut run, &[], &HashMap::new(), None, &profile)
            .await;
        assert_eq!(text, "Montreal dresses Suzuki at center.");
        assert!(run.errors.is_empty());
    }

    #[tokio::test]
    async fn test_synthesize_degrades_to_fallback() {
        let llm = Arc::new(MockLlmClient::new().with_default(MockBehavior::Fail(
            ProviderError::Exhausted {
                attempts: 3,
                message: "429".to_string(),
            },
        )));
        let synthesizer = Synthesizer::new(llm);
        let mut run = run_with_roster();
        let profile = resolve_profile(None, None).unwrap();
        let text = synthesizer
            .synthesize(&mut run, &[], &HashMap::new(), None, &profile)
            .await;
        assert_eq!(text, FALLBACK_RESPONSE);
        assert_eq!(run.errors.len(), 1);
        assert!(run.errors[0].contains("synthesis failed"));
    }
}
