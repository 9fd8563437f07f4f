//! # Chat Translator Library
//!
//! 为实时聊天消息流提供带上下文的模型翻译和回复生成。
//!
//! ## 模块组织
//!
//! - `translation` - 缓存、请求队列、上下文收集、模型客户端和翻译服务
//! - `env` - 类型安全的环境变量

pub mod env;
pub mod translation;

// Re-export commonly used items for convenience
pub use translation::{
    ChangeWatcher, MessageLog, MessageRecord, Settings, TranslationError, TranslationResult,
    TranslationService,
};
