//! 翻译模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制

use std::fmt;

use thiserror::Error;

/// HTTP 错误响应体保留的最大字符数
pub const ERROR_BODY_LIMIT: usize = 200;

/// 翻译错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslationError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 网络错误
    #[error("网络错误: {0}")]
    NetworkError(String),

    /// 超时错误
    #[error("请求超时: {0}")]
    TimeoutError(String),

    /// 非成功状态码
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// 响应体不是合法的 JSON
    #[error("接口返回的 JSON 无效: {0}")]
    InvalidResponse(String),

    /// 响应合法但没有可用文本
    #[error("模型返回为空")]
    EmptyResponse,

    /// 输入验证错误
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// 持久化存储错误
    #[error("存储错误: {0}")]
    StorageError(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// 输入框写入失败
    #[error("写入失败: {0}")]
    ComposerError(String),

    /// 请求队列已关闭
    #[error("请求队列已关闭")]
    QueueClosed,

    /// 内部错误
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl TranslationError {
    /// 由状态码和原始响应体构造 HTTP 错误，响应体会被截断
    pub fn http_status(status: u16, body: &str) -> Self {
        let body = if body.is_empty() {
            "unknown error".to_string()
        } else {
            body.chars().take(ERROR_BODY_LIMIT).collect()
        };
        TranslationError::HttpStatus { status, body }
    }

    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::NetworkError(_) => true,
            TranslationError::TimeoutError(_) => true,
            TranslationError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            TranslationError::EmptyResponse => true,
            TranslationError::StorageError(_) => true,
            TranslationError::ConfigError(_) => false,
            TranslationError::InvalidResponse(_) => false,
            TranslationError::InvalidInput(_) => false,
            TranslationError::SerializationError(_) => false,
            TranslationError::ComposerError(_) => false,
            TranslationError::QueueClosed => false,
            TranslationError::InternalError(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranslationError::ConfigError(_) => ErrorSeverity::Critical,
            TranslationError::NetworkError(_) => ErrorSeverity::Warning,
            TranslationError::TimeoutError(_) => ErrorSeverity::Warning,
            TranslationError::HttpStatus { .. } => ErrorSeverity::Error,
            TranslationError::InvalidResponse(_) => ErrorSeverity::Error,
            TranslationError::EmptyResponse => ErrorSeverity::Warning,
            TranslationError::InvalidInput(_) => ErrorSeverity::Info,
            TranslationError::StorageError(_) => ErrorSeverity::Warning,
            TranslationError::SerializationError(_) => ErrorSeverity::Error,
            TranslationError::ComposerError(_) => ErrorSeverity::Warning,
            TranslationError::QueueClosed => ErrorSeverity::Critical,
            TranslationError::InternalError(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslationError::ConfigError(_) => ErrorCategory::Configuration,
            TranslationError::NetworkError(_) => ErrorCategory::Network,
            TranslationError::TimeoutError(_) => ErrorCategory::Timeout,
            TranslationError::HttpStatus { .. } => ErrorCategory::Service,
            TranslationError::InvalidResponse(_) => ErrorCategory::Parsing,
            TranslationError::EmptyResponse => ErrorCategory::Service,
            TranslationError::InvalidInput(_) => ErrorCategory::Input,
            TranslationError::StorageError(_) => ErrorCategory::Storage,
            TranslationError::SerializationError(_) => ErrorCategory::Serialization,
            TranslationError::ComposerError(_) => ErrorCategory::Composer,
            TranslationError::QueueClosed => ErrorCategory::Internal,
            TranslationError::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(self, context: T) -> Self {
        let new_msg = |msg: String| format!("{} (上下文: {})", msg, context);

        match self {
            TranslationError::ConfigError(msg) => TranslationError::ConfigError(new_msg(msg)),
            TranslationError::NetworkError(msg) => TranslationError::NetworkError(new_msg(msg)),
            TranslationError::TimeoutError(msg) => TranslationError::TimeoutError(new_msg(msg)),
            TranslationError::InvalidResponse(msg) => {
                TranslationError::InvalidResponse(new_msg(msg))
            }
            TranslationError::InvalidInput(msg) => TranslationError::InvalidInput(new_msg(msg)),
            TranslationError::StorageError(msg) => TranslationError::StorageError(new_msg(msg)),
            TranslationError::SerializationError(msg) => {
                TranslationError::SerializationError(new_msg(msg))
            }
            TranslationError::ComposerError(msg) => TranslationError::ComposerError(new_msg(msg)),
            TranslationError::InternalError(msg) => TranslationError::InternalError(new_msg(msg)),
            other @ (TranslationError::HttpStatus { .. }
            | TranslationError::EmptyResponse
            | TranslationError::QueueClosed) => other,
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Network,
    Timeout,
    Service,
    Parsing,
    Input,
    Storage,
    Serialization,
    Composer,
    Internal,
}

impl From<std::io::Error> for TranslationError {
    fn from(error: std::io::Error) -> Self {
        TranslationError::StorageError(format!("IO错误: {}", error))
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::SerializationError(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::ConfigError(format!("TOML解析错误: {}", error))
    }
}

impl From<toml::ser::Error> for TranslationError {
    fn from(error: toml::ser::Error) -> Self {
        TranslationError::SerializationError(format!("TOML序列化错误: {}", error))
    }
}

impl From<reqwest::Error> for TranslationError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TranslationError::TimeoutError(error.to_string())
        } else {
            TranslationError::NetworkError(error.to_string())
        }
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

/// 错误统计信息
#[derive(Debug, Clone, Default)]
pub struct ErrorStats {
    pub total_errors: usize,
    pub by_category: std::collections::HashMap<ErrorCategory, usize>,
    pub by_severity: std::collections::HashMap<ErrorSeverity, usize>,
    pub retryable_errors: usize,
    pub critical_errors: usize,
}

impl ErrorStats {
    /// 记录错误
    pub fn record_error(&mut self, error: &TranslationError) {
        self.total_errors += 1;

        let category = error.category();
        *self.by_category.entry(category).or_insert(0) += 1;

        let severity = error.severity();
        *self.by_severity.entry(severity).or_insert(0) += 1;

        if error.is_retryable() {
            self.retryable_errors += 1;
        }

        if severity == ErrorSeverity::Critical {
            self.critical_errors += 1;
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Default::default();
    }

    /// 获取错误率
    pub fn error_rate(&self, total_operations: usize) -> f64 {
        if total_operations == 0 {
            0.0
        } else {
            self.total_errors as f64 / total_operations as f64
        }
    }
}

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 按严重程度记录错误
    pub fn log_error(error: &TranslationError) {
        match error.severity() {
            ErrorSeverity::Info => tracing::info!("翻译信息: {}", error),
            ErrorSeverity::Warning => tracing::warn!("翻译警告: {}", error),
            ErrorSeverity::Error => tracing::error!("翻译错误: {}", error),
            ErrorSeverity::Critical => tracing::error!("翻译严重错误: {}", error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_body_is_truncated() {
        let body = "x".repeat(500);
        match TranslationError::http_status(502, &body) {
            TranslationError::HttpStatus { status, body } => {
                assert_eq!(status, 502);
                assert_eq!(body.chars().count(), ERROR_BODY_LIMIT);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_http_status_empty_body() {
        let error = TranslationError::http_status(404, "");
        assert_eq!(error.to_string(), "HTTP 404: unknown error");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(TranslationError::http_status(503, "busy").is_retryable());
        assert!(TranslationError::http_status(429, "slow down").is_retryable());
        assert!(!TranslationError::http_status(401, "bad key").is_retryable());
        assert!(!TranslationError::InvalidResponse("eof".into()).is_retryable());
    }

    #[test]
    fn test_with_context_keeps_structured_variants() {
        let error = TranslationError::EmptyResponse.with_context("message 42");
        assert_eq!(error, TranslationError::EmptyResponse);

        let error = TranslationError::NetworkError("reset".into()).with_context("message 42");
        assert!(error.to_string().contains("message 42"));
    }

    #[test]
    fn test_error_stats() {
        let mut stats = ErrorStats::default();
        stats.record_error(&TranslationError::TimeoutError("60s".into()));
        stats.record_error(&TranslationError::ConfigError("missing model".into()));

        assert_eq!(stats.total_errors, 2);
        assert_eq!(stats.retryable_errors, 1);
        assert_eq!(stats.critical_errors, 1);
        assert_eq!(stats.by_category.get(&ErrorCategory::Timeout), Some(&1));
        assert_eq!(stats.error_rate(4), 0.5);
    }
}
