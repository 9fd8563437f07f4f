//! 输出端
//!
//! 服务本身不关心结果最终显示在哪里：译文交给 `TranslationSink`，
//! 生成的回复交给 `CompositionSink`，面向用户的状态提示交给 `StatusSink`。

use std::fmt;

use chrono::{DateTime, Utc};

use crate::translation::pipeline::MessageId;
use crate::translation::error::TranslationResult;

/// 状态级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for StatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusLevel::Info => write!(f, "info"),
            StatusLevel::Warning => write!(f, "warning"),
            StatusLevel::Error => write!(f, "error"),
        }
    }
}

/// 状态提示
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub level: StatusLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl StatusReport {
    pub fn new(level: StatusLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(StatusLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(StatusLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(StatusLevel::Error, message)
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.at.format("%H:%M:%S"), self.level, self.message)
    }
}

/// 状态提示接收端
pub trait StatusSink: Send + Sync {
    fn report(&self, report: StatusReport);
}

/// 默认实现：写入日志
#[derive(Debug, Default, Clone, Copy)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn report(&self, report: StatusReport) {
        match report.level {
            StatusLevel::Info => tracing::info!("{}", report.message),
            StatusLevel::Warning => tracing::warn!("{}", report.message),
            StatusLevel::Error => tracing::error!("{}", report.message),
        }
    }
}

/// 一条送达的译文
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub message: MessageId,
    pub text: String,
    pub from_cache: bool,
}

/// 译文接收端
pub trait TranslationSink: Send + Sync {
    fn deliver(&self, delivery: Delivery);
}

/// 只记录日志的译文接收端
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTranslationSink;

impl TranslationSink for LogTranslationSink {
    fn deliver(&self, delivery: Delivery) {
        tracing::info!("{} → {}", delivery.message, delivery.text);
    }
}

/// 把文本放进外部输入框
///
/// 失败时返回 `ComposerError`，调用方不会自动重试。
pub trait CompositionSink: Send + Sync {
    fn insert(&self, text: &str) -> TranslationResult<()>;
}
