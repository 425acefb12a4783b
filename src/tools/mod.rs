//! 工具层：封闭标识、注册表、统一信封与派发器，外加两个内置 HTTP 数据工具
//!
//! 其余协作工具（语义检索 / 分析查询 / 视频剪辑 / 可视化 / 合同数据）由宿主应用
//! 实现 Tool trait 后注册进来。

pub mod dispatcher;
pub mod registry;
pub mod roster;
pub mod schedule;
pub mod types;

pub use dispatcher::ToolDispatcher;
pub use registry::{Tool, ToolRegistry};
pub use roster::TeamRosterTool;
pub use schedule::LiveScheduleTool;
pub use types::{ToolCall, ToolKind, ToolOutput, ToolResult};
