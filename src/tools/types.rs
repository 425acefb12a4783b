//! 工具标识与结果信封
//!
//! ToolKind 是封闭枚举：注册时就只能出现这些标识，未知名字在派发时降级为
//! success:false 的信封而不是让循环失败。ToolResult 是统一结果信封，
//! 成功与失败都记录执行耗时与引用来源。

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 可注册的工具标识（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolKind {
    SemanticSearch,
    AnalyticsQuery,
    TeamRoster,
    LiveSchedule,
    VideoClips,
    VizSpec,
    MarketData,
}

impl ToolKind {
    pub const ALL: &'static [ToolKind] = &[
        ToolKind::SemanticSearch,
        ToolKind::AnalyticsQuery,
        ToolKind::TeamRoster,
        ToolKind::LiveSchedule,
        ToolKind::VideoClips,
        ToolKind::VizSpec,
        ToolKind::MarketData,
    ];

    /// 对 LLM 暴露的工具名（规划 JSON 中的 next_tool 字段取值）
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::SemanticSearch => "semantic_search",
            ToolKind::AnalyticsQuery => "analytics_query",
            ToolKind::TeamRoster => "get_team_roster",
            ToolKind::LiveSchedule => "get_live_schedule",
            ToolKind::VideoClips => "get_video_clips",
            ToolKind::VizSpec => "generate_viz_spec",
            ToolKind::MarketData => "get_market_data",
        }
    }

    pub fn parse(name: &str) -> Option<ToolKind> {
        Self::ALL.iter().copied().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Planner 产出的工具调用（tool 为字符串：未知名字由派发层处理）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    pub args: Value,
}

/// 工具实现的原始产出：数据 + 引用来源
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub data: Value,
    pub citations: Vec<String>,
}

impl ToolOutput {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            citations: Vec::new(),
        }
    }

    pub fn with_citations(mut self, citations: Vec<String>) -> Self {
        self.citations = citations;
        self
    }
}

/// 统一结果信封：成功与失败都携带耗时；失败把错误编码在 error 字段
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_type: String,
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub execution_time_ms: u64,
    #[serde(default)]
    pub citations: Vec<String>,
}

impl ToolResult {
    pub fn ok(tool_type: &str, output: ToolOutput, execution_time_ms: u64) -> Self {
        Self {
            tool_type: tool_type.to_string(),
            success: true,
            data: Some(output.data),
            error: None,
            execution_time_ms,
            citations: output.citations,
        }
    }

    pub fn failure(tool_type: &str, error: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            tool_type: tool_type.to_string(),
            success: false,
            data: None,
            error: Some(error.into()),
            execution_time_ms,
            citations: Vec::new(),
        }
    }

    /// 成功且数据非空（空对象/空数组/空串不算）
    pub fn has_data(&self) -> bool {
        if !self.success {
            return false;
        }
        match &self.data {
            None | Some(Value::Null) => false,
            Some(Value::Object(map)) => !map.is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }
}
