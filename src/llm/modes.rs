//! 生成模式注册表
//!
//! mode 选择「模型 + 采样参数」组合（general / fast / report）；
//! 显式 model 覆盖必须命中注册表中出现过的模型，否则拒绝。

use crate::error::AgentError;

/// 静态生成配置：一个 mode 对应一组模型与采样参数
#[derive(Debug, Clone, Copy)]
pub struct GenerationProfile {
    pub name: &'static str,
    pub model: &'static str,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    /// 是否并行启动深度研究分支
    pub deep_report: bool,
}

/// 注册表：mode 名 → 配置
pub const MODES: &[GenerationProfile] = &[
    GenerationProfile {
        name: "general",
        model: "gpt-4o",
        temperature: 0.3,
        max_tokens: 1200,
        top_p: 0.9,
        deep_report: false,
    },
    GenerationProfile {
        name: "fast",
        model: "gpt-4o-mini",
        temperature: 0.2,
        max_tokens: 600,
        top_p: 0.9,
        deep_report: false,
    },
    GenerationProfile {
        name: "report",
        model: "gpt-4o",
        temperature: 0.4,
        max_tokens: 2400,
        top_p: 0.9,
        deep_report: true,
    },
];

/// 规划调用固定用低温，与 mode 无关；严格重试时降到 0
pub const PLANNER_TEMPERATURE: f32 = 0.2;
pub const PLANNER_STRICT_TEMPERATURE: f32 = 0.0;
pub const PLANNER_MAX_TOKENS: u32 = 300;

/// 解析后的生成配置（model 可能被覆盖，故持有自有字符串）
#[derive(Debug, Clone)]
pub struct ResolvedProfile {
    pub name: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
    pub deep_report: bool,
}

/// 摘要与规划走 fast 档的模型
pub fn fast_model() -> &'static str {
    MODES
        .iter()
        .find(|p| p.name == "fast")
        .map(|p| p.model)
        .unwrap_or("gpt-4o-mini")
}

/// 解析 mode + 可选 model 覆盖
///
/// - mode 缺省为 general，未知 mode 返回 UnknownMode
/// - model 覆盖必须出现在注册表的模型集合中，否则返回 ModelNotAllowed
pub fn resolve_profile(
    mode: Option<&str>,
    model_override: Option<&str>,
) -> Result<ResolvedProfile, AgentError> {
    let mode_name = mode.unwrap_or("general");
    let profile = MODES
        .iter()
        .find(|p| p.name == mode_name)
        .ok_or_else(|| AgentError::UnknownMode(mode_name.to_string()))?;

    let model = match model_override {
        Some(m) => {
            if MODES.iter().any(|p| p.model == m) {
                m.to_string()
            } else {
                return Err(AgentError::ModelNotAllowed(m.to_string()));
            }
        }
        None => profile.model.to_string(),
    };

    Ok(ResolvedProfile {
        name: profile.name.to_string(),
        model,
        temperature: profile.temperature,
        max_tokens: profile.max_tokens,
        top_p: profile.top_p,
        deep_report: profile.deep_report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode_is_general() {
        let profile = resolve_profile(None, None).expect("general resolves");
        assert_eq!(profile.name, "general");
        assert_eq!(profile.model, "gpt-4o");
        assert!(!profile.deep_report);
    }

    #[test]
    fn test_report_mode_enables_deep_report() {
        let profile = resolve_profile(Some("report"), None).expect("report resolves");
        assert!(profile.deep_report);
        assert_eq!(profile.max_tokens, 2400);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let err = resolve_profile(Some("turbo"), None).expect_err("unknown mode");
        assert!(matches!(err, AgentError::UnknownMode(_)));
    }

    #[test]
    fn test_model_override_from_registry() {
        let profile =
            resolve_profile(Some("general"), Some("gpt-4o-mini")).expect("listed model");
        assert_eq!(profile.model, "gpt-4o-mini");
        assert_eq!(profile.name, "general");
    }

    #[test]
    fn test_unlisted_model_rejected() {
        let err = resolve_profile(None, Some("claude-best")).expect_err("unlisted model");
        assert!(matches!(err, AgentError::ModelNotAllowed(_)));
    }
}
