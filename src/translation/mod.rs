//! 翻译模块
//!
//! 采用清晰的模块化架构：
//! - **core**: 模型客户端、提示词、回复风格和翻译服务
//! - **pipeline**: 请求队列与去重、上下文收集、输出清理
//! - **storage**: 持久化存储和 LRU 缓存
//! - **config**: 设置管理
//! - **error**: 错误处理
//! - **watcher**: 消息变化监听
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chat_translator::translation::{
//!     ChangeWatcher, FileStore, MessageLog, MessageRecord, TranslationService,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let log = MessageLog::new();
//! let store = Arc::new(FileStore::open("/tmp/chat-translator")?);
//! let service = TranslationService::builder(store, Arc::new(log.clone())).build()?;
//! let (watcher, _task) = ChangeWatcher::spawn(service.clone());
//!
//! let id = log.push(MessageRecord {
//!     channel_id: "10".into(),
//!     message_id: "20".into(),
//!     author: "Alice".into(),
//!     text: "Hello there".into(),
//!     sequence_index: 0,
//! });
//! watcher.message_added(id)?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// 子模块声明
// ============================================================================

/// 设置管理模块 - 默认值、配置文件、持久化设置和环境变量
pub mod config;

/// 核心模块 - 翻译服务及其依赖的客户端、提示词和回复风格
pub mod core;

/// 错误处理模块 - 统一的错误类型和处理机制
pub mod error;

/// 处理管道模块 - 队列、去重、上下文和输出清理
pub mod pipeline;

/// 存储模块 - 持久化存储和翻译缓存
pub mod storage;

/// 消息变化监听
pub mod watcher;

// ============================================================================
// 核心API导出
// ============================================================================

pub use config::{config_file_exists, constants, ConfigManager, Provider, Settings};

pub use core::{
    builtin_presets, ChatMessage, CompletionClient, CompletionProvider, CompositionSink, Delivery,
    GeneratedReply, LogStatusSink, ProviderConfig, ReplyPreset, ReplyPresetSelector, Role,
    ScanSummary, ScheduleOutcome, ServiceStatsSnapshot, StatusLevel, StatusReport, StatusSink,
    TranslationService, TranslationSink, TranslationState,
};

pub use error::{
    ErrorCategory, ErrorSeverity, ErrorStats, TranslationError, TranslationResult,
};

pub use pipeline::{
    collect_latest, collect_window, normalize, sanitize_text, ContextLine, MessageId, MessageLog,
    MessageRecord, MessageSource, PendingSet, RequestQueue,
};

pub use storage::{CacheKey, CacheStats, FileStore, MemoryStore, PersistentStore, TranslationCache};

pub use watcher::{ChangeWatcher, WatchEvent, WatchSummary, WatcherHandle};
