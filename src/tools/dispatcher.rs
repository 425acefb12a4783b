//! 工具派发器
//!
//! execute(tool_name, args, run) 永远返回 ToolResult，不向外抛错：
//! 未知工具名、工具内部错误、超时都编码为 success:false 的信封，耗时在所有结局下记录；
//! 每次调用输出结构化审计日志（JSON）。派发器自身无状态，可被独立请求并发调用。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::engine::RunState;
use crate::tools::{ToolKind, ToolRegistry, ToolResult};

/// 工具派发器：持有注册表与单次调用超时
pub struct ToolDispatcher {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 执行指定工具；所有失败路径降级为信封，循环永远能继续
    pub async fn execute(&self, tool_name: &str, args: Value, run: &RunState) -> ToolResult {
        let start = Instant::now();

        let Some(kind) = ToolKind::parse(tool_name) else {
            let result = ToolResult::failure(
                tool_name,
                format!("unknown tool: {tool_name}"),
                elapsed_ms(start),
            );
            self.audit(tool_name, &args, &result);
            return result;
        };

        let Some(tool) = self.registry.get(kind) else {
            let result = ToolResult::failure(
                kind.as_str(),
                format!("tool not registered: {kind}"),
                elapsed_ms(start),
            );
            self.audit(kind.as_str(), &args, &result);
            return result;
        };

        let outcome = timeout(self.timeout, tool.run(&args, run)).await;
        let result = match outcome {
            Ok(Ok(output)) => ToolResult::ok(kind.as_str(), output, elapsed_ms(start)),
            Ok(Err(e)) => ToolResult::failure(kind.as_str(), e, elapsed_ms(start)),
            Err(_) => ToolResult::failure(
                kind.as_str(),
                format!("timed out after {}ms", self.timeout.as_millis()),
                elapsed_ms(start),
            ),
        };
        self.audit(kind.as_str(), &args, &result);
        result
    }

    fn audit(&self, tool: &str, args: &Value, result: &ToolResult) {
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool,
            "ok": result.success,
            "outcome": if result.success { "ok" } else { "error" },
            "duration_ms": result.execution_time_ms,
            "args_preview": args_preview(args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{RunState, UserContext, UserRole};
    use crate::tools::{Tool, ToolOutput};
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedTool {
        kind: ToolKind,
        outcome: Result<Value, String>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Tool for FixedTool {
        fn kind(&self) -> ToolKind {
            self.kind
        }

        fn description(&self) -> &str {
            "fixed outcome for tests"
        }

        async fn run(&self, _args: &Value, _run: &RunState) -> Result<ToolOutput, String> {
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            self.outcome
                .clone()
                .map(|v| ToolOutput::new(v).with_citations(vec!["test://fixed".to_string()]))
        }
    }

    fn run_state() -> RunState {
        RunState::new(
            "test query",
            UserContext {
                user_id: "u1".to_string(),
                role: UserRole::Analyst,
                team_scope: vec![],
                preferences: Default::default(),
            },
        )
    }

    fn dispatcher_with(tool: FixedTool, timeout: Duration) -> ToolDispatcher {
        let mut registry = ToolRegistry::new();
        registry.register(tool);
        ToolDispatcher::new(registry, timeout)
    }

    #[tokio::test]
    async fn test_unknown_tool_degrades_to_failure_result() {
        let dispatcher = ToolDispatcher::new(ToolRegistry::new(), Duration::from_secs(1));
        let result = dispatcher
            .execute("fetch_weather", json!({}), &run_state())
            .await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap_or("").contains("unknown tool"));
    }

    #[tokio::test]
    async fn test_unregistered_known_tool_degrades() {
        let dispatcher = ToolDispatcher::new(ToolRegistry::new(), Duration::from_secs(1));
        let result = dispatcher
            .execute("get_market_data", json!({}), &run_state())
            .await;
        assert!(!result.success);
        assert!(result
            .error
            .as_deref()
            .unwrap_or("")
            .contains("not registered"));
    }

    #[tokio::test]
    async fn test_tool_error_encoded_with_timing() {
        let dispatcher = dispatcher_with(
            FixedTool {
                kind: ToolKind::TeamRoster,
                outcome: Err("upstream 404".to_string()),
                delay: None,
            },
            Duration::from_secs(1),
        );
        let result = dispatcher
            .execute("get_team_roster", json!({"team": "MTL"}), &run_state())
            .await;
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("upstream 404"));
        assert_eq!(result.tool_type, "get_team_roster");
    }

    #[tokio::test]
    async fn test_timeout_encoded() {
        let dispatcher = dispatcher_with(
            FixedTool {
                kind: ToolKind::LiveSchedule,
                outcome: Ok(json!({"games": []})),
                delay: Some(Duration::from_millis(200)),
            },
            Duration::from_millis(20),
        );
        let result = dispatcher
            .execute("get_live_schedule", json!({}), &run_state())
            .await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap_or("").contains("timed out"));
    }

    #[tokio::test]
    async fn test_success_carries_data_and_citations() {
        let dispatcher = dispatcher_with(
            FixedTool {
                kind: ToolKind::TeamRoster,
                outcome: Ok(json!({"players": [{"name": "Cole Caufield"}]})),
                delay: None,
            },
            Duration::from_secs(1),
        );
        let result = dispatcher
            .execute("get_team_roster", json!({"team": "MTL"}), &run_state())
            .await;
        assert!(result.success);
        assert!(result.has_data());
        assert_eq!(result.citations, vec!["test://fixed".to_string()]);
    }
}
