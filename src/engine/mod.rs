//! 编排引擎：请求状态、Planner、研究分支、Coordinator 循环与 Synthesizer

pub mod coordinator;
pub mod planner;
pub mod research;
pub mod state;
pub mod synthesizer;

pub use coordinator::{Coordinator, EngineConfig};
pub use planner::{extract_json_block, parse_planned_call, PlannedCall, Planner};
pub use research::ResearchBrief;
pub use state::{Query, RunState, UserContext, UserRole};
pub use synthesizer::{Synthesizer, FALLBACK_RESPONSE};
