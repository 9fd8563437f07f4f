//! 核心翻译模块
//!
//! 包含模型客户端、提示词、回复风格、输出端和翻译服务
//!
//! ## 模块依赖关系
//!
//! ```text
//! TranslationService (service.rs)
//!     ├── RequestQueue / PendingSet (pipeline/queue.rs)
//!     ├── collect_window / collect_latest (pipeline/context.rs)
//!     ├── normalize (pipeline/normalize.rs)
//!     ├── TranslationCache (storage/cache.rs)
//!     ├── ConfigManager (config/manager.rs)
//!     ├── ReplyPresetSelector (presets.rs)
//!     └── CompletionProvider (client.rs)
//! ```

pub mod client;
pub mod presets;
pub mod prompt;
pub mod service;
pub mod sink;

// 重新导出主要类型
pub use client::{
    extract_completion_text, ChatMessage, CompletionClient, CompletionProvider, ProviderConfig, Role,
};
pub use presets::{builtin_presets, ReplyPreset, ReplyPresetSelector};
pub use service::{
    GeneratedReply, ScanSummary, ScheduleOutcome, ServiceBuilder, ServiceStats,
    ServiceStatsSnapshot, TranslationService, TranslationState,
};
pub use sink::{
    CompositionSink, Delivery, LogStatusSink, LogTranslationSink, StatusLevel, StatusReport,
    StatusSink, TranslationSink,
};
