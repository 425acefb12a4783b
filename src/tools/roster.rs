//! Roster 工具：球队阵容查询
//!
//! GET {stats_base_url}/roster/{TEAM}/current，带超时与 User-Agent；
//! 接受常见城市/队名并归一为三字码；响应归一为 {team, players:[{name, position, number}]}，
//! 引用来源记录实际抓取的 URL。

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::engine::RunState;
use crate::tools::{Tool, ToolKind, ToolOutput};

/// 常见别名 → 三字码（查询里写 "Montreal" / "the Habs" 也能落到 MTL）
const TEAM_ALIASES: &[(&str, &str)] = &[
    ("montreal", "MTL"),
    ("canadiens", "MTL"),
    ("habs", "MTL"),
    ("toronto", "TOR"),
    ("maple leafs", "TOR"),
    ("boston", "BOS"),
    ("bruins", "BOS"),
    ("ottawa", "OTT"),
    ("senators", "OTT"),
    ("detroit", "DET"),
    ("red wings", "DET"),
    ("tampa", "TBL"),
    ("lightning", "TBL"),
    ("florida", "FLA"),
    ("panthers", "FLA"),
    ("buffalo", "BUF"),
    ("sabres", "BUF"),
    ("rangers", "NYR"),
    ("islanders", "NYI"),
    ("pittsburgh", "PIT"),
    ("penguins", "PIT"),
    ("edmonton", "EDM"),
    ("oilers", "EDM"),
    ("calgary", "CGY"),
    ("flames", "CGY"),
    ("vancouver", "VAN"),
    ("canucks", "VAN"),
    ("colorado", "COL"),
    ("avalanche", "COL"),
    ("vegas", "VGK"),
    ("golden knights", "VGK"),
];

/// 归一化球队参数：三字码原样通过，别名查表，查不到返回 None
pub(crate) fn normalize_team(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some(trimmed.to_uppercase());
    }
    let lower = trimmed.to_lowercase();
    TEAM_ALIASES
        .iter()
        .find(|(alias, _)| lower.contains(alias))
        .map(|(_, code)| (*code).to_string())
}

/// 将上游 roster 响应（forwards / defensemen / goalies 三组）拍平为统一球员列表
pub(crate) fn normalize_roster(team: &str, body: &Value) -> Value {
    let mut players = Vec::new();
    for (group, position_fallback) in [
        ("forwards", "F"),
        ("defensemen", "D"),
        ("goalies", "G"),
    ] {
        let Some(items) = body.get(group).and_then(|v| v.as_array()) else {
            continue;
        };
        for item in items {
            let first = item
                .pointer("/firstName/default")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            let last = item
                .pointer("/lastName/default")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            let name = format!("{first} {last}").trim().to_string();
            if name.is_empty() {
                continue;
            }
            players.push(json!({
                "name": name,
                "position": item
                    .get("positionCode")
                    .and_then(|v| v.as_str())
                    .unwrap_or(position_fallback),
                "number": item.get("sweaterNumber").and_then(|v| v.as_u64()),
            }));
        }
    }
    json!({ "team": team, "players": players })
}

/// Roster 工具：按三字码抓取当前阵容
pub struct TeamRosterTool {
    client: Client,
    base_url: String,
}

impl TeamRosterTool {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("rinkside/0.1")
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch(&self, team: &str) -> Result<(Value, String), String> {
        let url = format!("{}/roster/{}/current", self.base_url, team);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body: Value = resp
            .json()
            .await
            .map_err(|e| format!("decode body: {e}"))?;
        Ok((body, url))
    }
}

#[async_trait]
impl Tool for TeamRosterTool {
    fn kind(&self) -> ToolKind {
        ToolKind::TeamRoster
    }

    fn description(&self) -> &str {
        "Fetch the current roster for one team. Args: {\"team\": \"MTL\"} (3-letter code or common team name)."
    }

    async fn run(&self, args: &Value, _run: &RunState) -> Result<ToolOutput, String> {
        let raw = args
            .get("team")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "missing team argument".to_string())?;
        let team = normalize_team(raw).ok_or_else(|| format!("unrecognized team: {raw}"))?;

        tracing::info!(team = %team, "roster tool fetch");
        let (body, url) = self.fetch(&team).await?;
        let data = normalize_roster(&team, &body);
        Ok(ToolOutput::new(data).with_citations(vec![url]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_team_codes_and_aliases() {
        assert_eq!(normalize_team("MTL"), Some("MTL".to_string()));
        assert_eq!(normalize_team("mtl"), Some("MTL".to_string()));
        assert_eq!(normalize_team("Montreal"), Some("MTL".to_string()));
        assert_eq!(normalize_team("the Maple Leafs"), Some("TOR".to_string()));
        assert_eq!(normalize_team("Atlantis"), None);
        assert_eq!(normalize_team(""), None);
    }

    #[test]
    fn test_normalize_roster_flattens_groups() {
        let body = json!({
            "forwards": [
                {"firstName": {"default": "Nick"}, "lastName": {"default": "Suzuki"}, "positionCode": "C", "sweaterNumber": 14}
            ],
            "defensemen": [
                {"firstName": {"default": "Mike"}, "lastName": {"default": "Matheson"}, "positionCode": "D", "sweaterNumber": 8}
            ],
            "goalies": [
                {"firstName": {"default": "Sam"}, "lastName": {"default": "Montembeault"}, "sweaterNumber": 35}
            ]
        });
        let data = normalize_roster("MTL", &body);
        let players = data["players"].as_array().expect("players array");
        assert_eq!(players.len(), 3);
        assert_eq!(players[0]["name"], "Nick Suzuki");
        assert_eq!(players[2]["position"], "G");
        assert_eq!(data["team"], "MTL");
    }

    #[test]
    fn test_normalize_roster_tolerates_missing_groups() {
        let data = normalize_roster("MTL", &json!({"forwards": []}));
        assert_eq!(data["players"].as_array().map(|a| a.len()), Some(0));
    }
}
