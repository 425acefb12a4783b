//! Schedule 工具：赛程 / 实时比分查询
//!
//! 有 team 参数时走 club-schedule/{TEAM}/week/now，否则走 schedule/{date|now}；
//! 上游按日分组的 gameWeek 结构拍平为统一的 games 列表（对阵、开球时间、状态、比分）。

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::engine::RunState;
use crate::tools::roster::normalize_team;
use crate::tools::{Tool, ToolKind, ToolOutput};

/// 拍平上游赛程响应：顶层 games 数组直接用，gameWeek 按日合并
pub(crate) fn normalize_schedule(body: &Value) -> Value {
    let mut games = Vec::new();
    let raw_games: Vec<&Value> = if let Some(items) = body.get("games").and_then(|v| v.as_array()) {
        items.iter().collect()
    } else if let Some(days) = body.get("gameWeek").and_then(|v| v.as_array()) {
        days.iter()
            .filter_map(|d| d.get("games").and_then(|v| v.as_array()))
            .flatten()
            .collect()
    } else {
        Vec::new()
    };

    for game in raw_games {
        let away = game.pointer("/awayTeam/abbrev").and_then(|v| v.as_str());
        let home = game.pointer("/homeTeam/abbrev").and_then(|v| v.as_str());
        let (Some(away), Some(home)) = (away, home) else {
            continue;
        };
        let mut entry = json!({
            "away": away,
            "home": home,
            "start": game.get("startTimeUTC").and_then(|v| v.as_str()),
            "state": game.get("gameState").and_then(|v| v.as_str()).unwrap_or("FUT"),
        });
        let away_score = game.pointer("/awayTeam/score").and_then(|v| v.as_u64());
        let home_score = game.pointer("/homeTeam/score").and_then(|v| v.as_u64());
        if let (Some(a), Some(h)) = (away_score, home_score) {
            entry["score"] = json!(format!("{a}-{h}"));
        }
        games.push(entry);
    }
    json!({ "games": games })
}

/// Schedule 工具：按球队或日期抓取赛程与比分
pub struct LiveScheduleTool {
    client: Client,
    base_url: String,
}

impl LiveScheduleTool {
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

    fn build_url(&self, args: &Value) -> Result<String, String> {
        if let Some(raw) = args.get("team").and_then(|v| v.as_str()) {
            let team = normalize_team(raw).ok_or_else(|| format!("unrecognized team: {raw}"))?;
            return Ok(format!("{}/club-schedule/{}/week/now", self.base_url, team));
        }
        // date 格式 YYYY-MM-DD；缺省取当日
        match args.get("date").and_then(|v| v.as_str()) {
            Some(date) if !date.trim().is_empty() => {
                Ok(format!("{}/schedule/{}", self.base_url, date.trim()))
            }
            _ => Ok(format!("{}/schedule/now", self.base_url)),
        }
    }

    async fn fetch(&self, url: &str) -> Result<Value, String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        resp.json().await.map_err(|e| format!("decode body: {e}"))
    }
}

#[async_trait]
impl Tool for LiveScheduleTool {
    fn kind(&self) -> ToolKind {
        ToolKind::LiveSchedule
    }

    fn description(&self) -> &str {
        "Fetch upcoming or live games with scores. Args: {\"team\": \"MTL\"} for one club's week, or {\"date\": \"YYYY-MM-DD\"} for the league slate (both optional)."
    }

    async fn run(&self, args: &Value, _run: &RunState) -> Result<ToolOutput, String> {
        let url = self.build_url(args)?;
        tracing::info!(url = %url, "schedule tool fetch");
        let body = self.fetch(&url).await?;
        Ok(ToolOutput::new(normalize_schedule(&body)).with_citations(vec![url]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_schedule_from_game_week() {
        let body = json!({
            "gameWeek": [
                {"date": "2026-02-07", "games": [
                    {"awayTeam": {"abbrev": "MTL", "score": 3}, "homeTeam": {"abbrev": "TOR", "score": 2},
                     "startTimeUTC": "2026-02-08T00:00:00Z", "gameState": "FINAL"}
                ]},
                {"date": "2026-02-09", "games": [
                    {"awayTeam": {"abbrev": "BOS"}, "homeTeam": {"abbrev": "MTL"},
                     "startTimeUTC": "2026-02-10T00:00:00Z", "gameState": "FUT"}
                ]}
            ]
        });
        let data = normalize_schedule(&body);
        let games = data["games"].as_array().expect("games array");
        assert_eq!(games.len(), 2);
        assert_eq!(games[0]["score"], "3-2");
        assert_eq!(games[1]["state"], "FUT");
        assert!(games[1].get("score").is_none() || games[1]["score"].is_null());
    }

    #[test]
    fn test_normalize_schedule_skips_malformed_games() {
        let body = json!({"games": [{"awayTeam": {}, "homeTeam": {"abbrev": "TOR"}}]});
        let data = normalize_schedule(&body);
        assert_eq!(data["games"].as_array().map(|a| a.len()), Some(0));
    }
}
