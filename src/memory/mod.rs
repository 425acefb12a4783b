//! 会话记忆层：线程存储、硬剪枝、异步压缩与实体追踪

pub mod compaction;
pub mod entities;
pub mod store;
pub mod thread;

pub use compaction::{naive_summary, Compactor};
pub use entities::extract_entities;
pub use store::{ConversationStore, MemoryConfig};
pub use thread::{thread_key, ConversationSummary, ConversationThread, Message, Role};
