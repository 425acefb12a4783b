//! Rinkside - 冰球分析对话智能体
//!
//! 入口：初始化日志、构建组件，stdin REPL 驱动 process_query。

use anyhow::Context;
use rinkside::config::load_config;
use rinkside::engine::{Query, UserContext, UserRole};
use rinkside::{create_agent_components, process_query};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().context("log filter")?))
        .with(fmt::layer())
        .init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });
    let components = create_agent_components(&cfg);

    let user = UserContext {
        user_id: "local".to_string(),
        role: UserRole::Analyst,
        team_scope: Vec::new(),
        preferences: Default::default(),
    };

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    stdout
        .write_all(b"rinkside ready - ask a hockey question (exit to quit)\n> ")
        .await?;
    stdout.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        let response = process_query(
            &components,
            Query {
                text: input.to_string(),
                ..Default::default()
            },
            &user,
        )
        .await;

        let line = format!(
            "\n{}\n[{} | {} tool call(s) | {}ms]\n> ",
            response.response,
            response.query_type,
            response.tool_results.len(),
            response.processing_time_ms
        );
        stdout.write_all(line.as_bytes()).await?;
        stdout.flush().await?;
    }

    Ok(())
}
