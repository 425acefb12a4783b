//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `RINKSIDE__*` 覆盖
//! （双下划线表示嵌套，如 `RINKSIDE__LLM__RATE_LIMIT_RPS=5`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::engine::EngineConfig;
use crate::llm::RetryConfig;
use crate::memory::MemoryConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub engine: EngineConfig,
    pub tools: ToolsSection,
}

/// [app] 段：应用名与记忆上限
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 会话软上限（超过触发压缩）
    #[serde(default = "default_max_context_turns")]
    pub max_context_turns: usize,
    /// 压缩后保留的尾部消息数
    #[serde(default = "default_summary_compact_to")]
    pub summary_compact_to: usize,
}

fn default_max_context_turns() -> usize {
    20
}

fn default_summary_compact_to() -> usize {
    8
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            max_context_turns: default_max_context_turns(),
            summary_compact_to: default_summary_compact_to(),
        }
    }
}

impl AppSection {
    pub fn memory_config(&self) -> MemoryConfig {
        MemoryConfig {
            max_turns: self.max_context_turns,
            summary_compact_to: self.summary_compact_to,
        }
    }
}

/// [llm] 段：端点、限速与重试
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// OpenAI 兼容端点；未设置时用官方默认
    pub base_url: Option<String>,
    /// 进程级限速（每秒请求数，所有并发请求共享）
    #[serde(default = "default_rate_limit_rps")]
    pub rate_limit_rps: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_rate_limit_rps() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: None,
            rate_limit_rps: default_rate_limit_rps(),
            request_timeout_secs: default_request_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

/// [tools] 段：数据端点与单次调用超时
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// 联盟数据 API（roster / schedule）
    #[serde(default = "default_stats_base_url")]
    pub stats_base_url: String,
}

fn default_tool_timeout_secs() -> u64 {
    20
}

fn default_stats_base_url() -> String {
    "https://api-web.nhle.com/v1".to_string()
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            stats_base_url: default_stats_base_url(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 RINKSIDE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 RINKSIDE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{name}.toml");
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("RINKSIDE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
