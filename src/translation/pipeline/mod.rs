//! 翻译管道模块
//!
//! 提供请求队列与去重、上下文收集和模型输出清理

pub mod context;
pub mod normalize;
pub mod queue;

// 重新导出主要类型
pub use context::{
    collect_latest, collect_window, truncate, ContextLine, MessageId, MessageLog, MessageRecord,
    MessageSource,
};
pub use normalize::{normalize, sanitize_text};
pub use queue::{KeyState, PendingGuard, PendingSet, QueueStats, RequestQueue};
