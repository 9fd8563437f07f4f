//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量访问

use std::env;
use std::fmt;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => {
                if let Some(default) = Self::DEFAULT {
                    Ok(default)
                } else {
                    Err(EnvError {
                        variable: Self::NAME.to_string(),
                        message: "Required environment variable not set".to_string(),
                    })
                }
            }
        }
    }

    /// 只读取显式设置的值，未设置时返回 `Ok(None)`，不回退到默认值
    fn lookup() -> EnvResult<Option<T>> {
        match env::var(Self::NAME) {
            Ok(value) if value.trim().is_empty() => Ok(None),
            Ok(value) => Self::parse(&value).map(Some),
            Err(_) => Ok(None),
        }
    }
}

/// 服务商相关环境变量
pub mod provider {
    use super::*;

    /// Chat Completion 接口地址
    pub struct ApiEndpoint;
    impl EnvVar<String> for ApiEndpoint {
        const NAME: &'static str = "CHAT_TRANSLATOR_API_ENDPOINT";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Chat completion endpoint URL";

        fn parse(value: &str) -> EnvResult<String> {
            let url = value.trim();
            if url.starts_with("http://") || url.starts_with("https://") {
                Ok(url.to_string())
            } else {
                Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "API URL must start with http:// or https://".to_string(),
                })
            }
        }
    }

    /// API 密钥
    pub struct ApiKey;
    impl EnvVar<String> for ApiKey {
        const NAME: &'static str = "CHAT_TRANSLATOR_API_KEY";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Bearer token sent to the completion provider";

        fn parse(value: &str) -> EnvResult<String> {
            Ok(value.trim().to_string())
        }
    }

    /// 模型名称
    pub struct Model;
    impl EnvVar<String> for Model {
        const NAME: &'static str = "CHAT_TRANSLATOR_MODEL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Model name sent with every completion request";

        fn parse(value: &str) -> EnvResult<String> {
            Ok(value.trim().to_string())
        }
    }

    /// 两次请求之间的最小间隔
    pub struct RequestIntervalMs;
    impl EnvVar<u64> for RequestIntervalMs {
        const NAME: &'static str = "CHAT_TRANSLATOR_REQUEST_INTERVAL_MS";
        const DEFAULT: Option<u64> = Some(900);
        const DESCRIPTION: &'static str = "Minimum spacing between request dispatches (100-5000 ms)";

        fn parse(value: &str) -> EnvResult<u64> {
            parse_ranged_usize(value, Self::NAME, 100, 5000).map(|v| v as u64)
        }
    }
}

/// 翻译相关环境变量
pub mod translation {
    use super::*;

    /// 目标语言
    pub struct TargetLang;
    impl EnvVar<String> for TargetLang {
        const NAME: &'static str = "CHAT_TRANSLATOR_TARGET_LANG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Target language, free text (e.g. 简体中文, English)";

        fn parse(value: &str) -> EnvResult<String> {
            let lang = value.trim();
            if lang.is_empty() {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Language cannot be empty".to_string(),
                });
            }
            Ok(lang.to_string())
        }
    }

    /// 自动翻译开关
    pub struct AutoTranslate;
    impl EnvVar<bool> for AutoTranslate {
        const NAME: &'static str = "CHAT_TRANSLATOR_AUTO_TRANSLATE";
        const DEFAULT: Option<bool> = Some(true);
        const DESCRIPTION: &'static str = "Translate newly observed messages automatically";

        fn parse(value: &str) -> EnvResult<bool> {
            parse_bool(value, Self::NAME)
        }
    }
}

/// 缓存和存储相关环境变量
pub mod storage {
    use super::*;

    /// 缓存容量
    pub struct CacheCapacity;
    impl EnvVar<usize> for CacheCapacity {
        const NAME: &'static str = "CHAT_TRANSLATOR_CACHE_CAPACITY";
        const DEFAULT: Option<usize> = Some(1000);
        const DESCRIPTION: &'static str = "Maximum number of cached translations";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_ranged_usize(value, Self::NAME, 1, 100_000)
        }
    }

    /// 数据目录
    pub struct DataDir;
    impl EnvVar<String> for DataDir {
        const NAME: &'static str = "CHAT_TRANSLATOR_DATA_DIR";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Directory holding persisted settings and cache";

        fn parse(value: &str) -> EnvResult<String> {
            Ok(shellexpand::tilde(value.trim()).into_owned())
        }
    }
}

/// 日志级别
pub struct LogLevel;
impl EnvVar<String> for LogLevel {
    const NAME: &'static str = "CHAT_TRANSLATOR_LOG_LEVEL";
    const DEFAULT: Option<String> = None;
    const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

    fn get() -> EnvResult<String> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => Ok("info".to_string()),
        }
    }

    fn parse(value: &str) -> EnvResult<String> {
        match value.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
            _ => Err(EnvError {
                variable: Self::NAME.to_string(),
                message: format!("Invalid log level '{}'. Use: trace, debug, info, warn, error", value),
            }),
        }
    }
}

/// 辅助函数
fn parse_bool(value: &str, var_name: &str) -> EnvResult<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "enabled" => Ok(true),
        "false" | "0" | "no" | "off" | "disabled" => Ok(false),
        _ => Err(EnvError {
            variable: var_name.to_string(),
            message: format!(
                "Invalid boolean value '{}'. Use: true/false, 1/0, yes/no, on/off, enabled/disabled",
                value
            ),
        }),
    }
}

fn parse_ranged_usize(value: &str, var_name: &str, min: usize, max: usize) -> EnvResult<usize> {
    let num: usize = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid positive number".to_string(),
    })?;

    if num < min {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} is below minimum {}", num, min),
        });
    }

    if num > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} exceeds maximum {}", num, max),
        });
    }

    Ok(num)
}

/// 环境变量文档生成器
pub fn generate_env_docs() -> String {
    let rows: [(&str, &str); 9] = [
        (provider::ApiEndpoint::NAME, provider::ApiEndpoint::DESCRIPTION),
        (provider::ApiKey::NAME, provider::ApiKey::DESCRIPTION),
        (provider::Model::NAME, provider::Model::DESCRIPTION),
        (provider::RequestIntervalMs::NAME, provider::RequestIntervalMs::DESCRIPTION),
        (translation::TargetLang::NAME, translation::TargetLang::DESCRIPTION),
        (translation::AutoTranslate::NAME, translation::AutoTranslate::DESCRIPTION),
        (storage::CacheCapacity::NAME, storage::CacheCapacity::DESCRIPTION),
        (storage::DataDir::NAME, storage::DataDir::DESCRIPTION),
        (LogLevel::NAME, LogLevel::DESCRIPTION),
    ];

    let mut docs = String::from("# Environment Variables\n\n");
    for (name, description) in rows {
        docs.push_str(&format!("- `{}`: {}\n", name, description));
    }
    docs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_parsing() {
        assert!(translation::AutoTranslate::parse("true").unwrap());
        assert!(translation::AutoTranslate::parse("YES").unwrap());
        assert!(!translation::AutoTranslate::parse("off").unwrap());
        assert!(translation::AutoTranslate::parse("maybe").is_err());
    }

    #[test]
    fn test_url_validation() {
        assert!(provider::ApiEndpoint::parse("https://api.deepseek.com/chat/completions").is_ok());
        assert!(provider::ApiEndpoint::parse("ftp://example.com").is_err());
    }

    #[test]
    fn test_interval_range() {
        assert_eq!(provider::RequestIntervalMs::parse("900").unwrap(), 900);
        assert!(provider::RequestIntervalMs::parse("50").is_err());
        assert!(provider::RequestIntervalMs::parse("6000").is_err());
    }

    #[test]
    fn test_data_dir_expands_tilde() {
        let dir = storage::DataDir::parse("~/chat").unwrap();
        assert!(!dir.starts_with('~'));
        assert!(dir.ends_with("chat"));
    }

    #[test]
    fn test_log_level() {
        assert_eq!(LogLevel::parse("DEBUG").unwrap(), "debug");
        assert!(LogLevel::parse("loud").is_err());
    }

    #[test]
    fn test_docs_list_every_variable() {
        let docs = generate_env_docs();
        assert!(docs.contains("CHAT_TRANSLATOR_API_ENDPOINT"));
        assert!(docs.contains("CHAT_TRANSLATOR_DATA_DIR"));
    }
}
