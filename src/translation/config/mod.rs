//! 翻译配置管理模块
//!
//! 提供设置的加载、保存和校验，支持配置文件、持久化存储和环境变量

pub mod manager;

// 重新导出主要类型
pub use manager::{ConfigManager, Provider, Settings};

/// 配置常量
pub mod constants {
    // 持久化键
    pub const SETTINGS_STORE_KEY: &str = "ai_translator_settings_v1";
    pub const CACHE_STORE_KEY: &str = "ai_translator_cache_v1";
    pub const CACHE_SAVE_DEBOUNCE_MS: u64 = 1200;

    // 服务商预设
    pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
    pub const OPENAI_MODEL: &str = "gpt-4o-mini";
    pub const DEEPSEEK_ENDPOINT: &str = "https://api.deepseek.com/chat/completions";
    pub const DEEPSEEK_MODEL: &str = "deepseek-chat";

    // 默认设置
    pub const DEFAULT_TARGET_LANGUAGE: &str = "简体中文";
    pub const DEFAULT_CONTEXT_SIZE: usize = 6;
    pub const DEFAULT_TEMPERATURE: f32 = 0.2;
    pub const DEFAULT_REQUEST_INTERVAL_MS: u64 = 900;
    pub const DEFAULT_MAX_CACHE_ENTRIES: usize = 1000;
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
    pub const RANDOM_PRESET_ID: &str = "random";

    // 取值范围
    pub const CONTEXT_SIZE_RANGE: (usize, usize) = (1, 20);
    pub const TEMPERATURE_RANGE: (f32, f32) = (0.0, 2.0);
    pub const REQUEST_INTERVAL_RANGE_MS: (u64, u64) = (100, 5000);
    pub const CACHE_ENTRIES_RANGE: (usize, usize) = (1, 100_000);
    pub const REQUEST_TIMEOUT_RANGE_SECS: (u64, u64) = (1, 600);

    // 上下文截断
    pub const WINDOW_TEXT_LIMIT: usize = 300;
    pub const LATEST_TEXT_LIMIT: usize = 360;
    pub const TRUNCATION_MARKER: &str = "...";

    // 扫描数量
    pub const INITIAL_SCAN_LIMIT: usize = 60;
    pub const MANUAL_SCAN_LIMIT: usize = 100;
    pub const MIN_REPLY_CONTEXT: usize = 2;

    pub const DEFAULT_SYSTEM_PROMPT_TRANSLATE: &str = "You are a precise conversation translator. Use context to disambiguate meaning, keep names/mentions/emoji, and return only translated message text. Do not include speaker names, labels, or bracket tags like [name].";
    pub const DEFAULT_SYSTEM_PROMPT_REPLY: &str = "You are an assistant that writes natural chat replies based on conversation context. Keep tone consistent with context.";

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "chat-translator.toml",
        ".chat-translator.toml",
        "~/.config/chat-translator/config.toml",
        "/etc/chat-translator/config.toml",
    ];

    pub const DEFAULT_DATA_DIR: &str = "~/.config/chat-translator";
}

/// 便利函数
pub fn config_file_exists() -> bool {
    constants::CONFIG_PATHS
        .iter()
        .any(|path| std::path::Path::new(shellexpand::tilde(path).as_ref()).exists())
}
