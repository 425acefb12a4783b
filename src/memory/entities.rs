//! 实体提取（尽力而为）
//!
//! 每轮结束后从查询文本与成功的工具结果里提取「最近提到的球队/球员」，
//! 合并进线程的 last_entities，供下一轮规划与合成消解代词（"their roster"）。
//! 提取失败只记日志并吞掉，绝不影响请求。

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::tools::ToolResult;

/// NHL 三字码全集（过滤普通大写缩写的噪音）
const TEAM_CODES: &[&str] = &[
    "ANA", "BOS", "BUF", "CAR", "CBJ", "CGY", "CHI", "COL", "DAL", "DET", "EDM", "FLA", "LAK",
    "MIN", "MTL", "NJD", "NSH", "NYI", "NYR", "OTT", "PHI", "PIT", "SEA", "SJS", "STL", "TBL",
    "TOR", "UTA", "VAN", "VGK", "WPG", "WSH",
];

fn code_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z]{3}\b").ok()).as_ref()
}

fn name_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z][a-z]+ [A-Z][a-z]+\b").ok())
        .as_ref()
}

/// 查询中不应当被当成人名的常见开头词对
const NAME_STOPWORDS: &[&str] = &["Stanley Cup", "Eastern Conference", "Western Conference"];

/// 从一轮的查询与工具结果提取实体；失败路径返回已提取的部分
pub fn extract_entities(query: &str, results: &[ToolResult]) -> HashMap<String, String> {
    let mut entities = HashMap::new();

    // 工具负载优先：结构化字段比文本猜测可靠
    for result in results.iter().filter(|r| r.success) {
        let Some(data) = result.data.as_ref() else {
            continue;
        };
        if let Some(team) = data.get("team").and_then(|v| v.as_str()) {
            entities.insert("team".to_string(), team.to_string());
        }
        if let Some(player) = data.get("player").and_then(|v| v.as_str()) {
            entities.insert("player".to_string(), player.to_string());
        }
        // 单一命中的球员列表也算明确指代
        if let Some(players) = data.get("players").and_then(|v| v.as_array()) {
            if players.len() == 1 {
                if let Some(name) = players[0].get("name").and_then(|v| v.as_str()) {
                    entities.insert("player".to_string(), name.to_string());
                }
            }
        }
    }

    if let Some(re) = code_regex() {
        for m in re.find_iter(query) {
            if TEAM_CODES.contains(&m.as_str()) {
                entities
                    .entry("team".to_string())
                    .or_insert_with(|| m.as_str().to_string());
                break;
            }
        }
    } else {
        tracing::debug!("team code regex unavailable, skipping text extraction");
    }

    if !entities.contains_key("player") {
        if let Some(re) = name_regex() {
            for m in re.find_iter(query) {
                if NAME_STOPWORDS.contains(&m.as_str()) {
                    continue;
                }
                entities.insert("player".to_string(), m.as_str().to_string());
                break;
            }
        }
    }

    entities
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolOutput, ToolResult};
    use serde_json::json;

    #[test]
    fn test_team_code_from_query() {
        let entities = extract_entities("How did MTL do last night?", &[]);
        assert_eq!(entities.get("team").map(String::as_str), Some("MTL"));
    }

    #[test]
    fn test_generic_acronym_ignored() {
        let entities = extract_entities("What does GAA mean in the NHL?", &[]);
        assert!(!entities.contains_key("team"));
    }

    #[test]
    fn test_player_name_from_query() {
        let entities = extract_entities("How many goals does Cole Caufield have?", &[]);
        assert_eq!(
            entities.get("player").map(String::as_str),
            Some("Cole Caufield")
        );
    }

    #[test]
    fn test_stopword_pairs_skipped() {
        let entities = extract_entities("Who wins the Stanley Cup this year?", &[]);
        assert!(!entities.contains_key("player"));
    }

    #[test]
    fn test_tool_payload_beats_text() {
        let results = vec![ToolResult::ok(
            "get_team_roster",
            ToolOutput::new(json!({"team": "TOR", "players": [{"name": "Auston Matthews"}]})),
            3,
        )];
        let entities = extract_entities("their roster please, MTL?", &results);
        // 结构化 team 字段优先；文本码只在缺省时补充
        assert_eq!(entities.get("team").map(String::as_str), Some("TOR"));
        assert_eq!(
            entities.get("player").map(String::as_str),
            Some("Auston Matthews")
        );
    }

    #[test]
    fn test_failed_results_ignored() {
        let results = vec![ToolResult::failure("get_team_roster", "HTTP 500", 3)];
        let entities = extract_entities("anything", &results);
        assert!(entities.is_empty());
    }
}
