//! 设置管理器
//!
//! 设置按层合并：默认值 → 配置文件 → 持久化存储中保存的设置 → 环境变量。
//! 任何一层无法解析都会被跳过并记录警告，加载本身从不失败。
//! 保存是唯一的修改途径。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::constants;
use crate::env::{provider, storage, translation, EnvVar};
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::storage::PersistentStore;

/// 服务商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAi,
    DeepSeek,
    Custom,
}

impl Provider {
    /// 预设的接口地址和模型，自定义服务商没有预设
    pub fn preset(self) -> Option<(&'static str, &'static str)> {
        match self {
            Provider::OpenAi => Some((constants::OPENAI_ENDPOINT, constants::OPENAI_MODEL)),
            Provider::DeepSeek => Some((constants::DEEPSEEK_ENDPOINT, constants::DEEPSEEK_MODEL)),
            Provider::Custom => None,
        }
    }
}

/// 全局设置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    // 基础开关
    pub enabled: bool,
    pub auto_translate: bool,
    pub target_language: String,
    pub context_size: usize,

    // 服务商配置
    pub provider: Provider,
    pub api_endpoint: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub request_interval_ms: u64,
    pub request_timeout_secs: u64,

    // 缓存配置
    pub max_cache_entries: usize,
    pub cache_save_debounce_ms: u64,

    // 回复生成
    pub reply_preset_id: String,
    pub reply_extra_instruction: String,
    pub system_prompt_translate: String,
    pub system_prompt_reply: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_translate: true,
            target_language: constants::DEFAULT_TARGET_LANGUAGE.to_string(),
            context_size: constants::DEFAULT_CONTEXT_SIZE,

            provider: Provider::OpenAi,
            api_endpoint: constants::OPENAI_ENDPOINT.to_string(),
            api_key: String::new(),
            model: constants::OPENAI_MODEL.to_string(),
            temperature: constants::DEFAULT_TEMPERATURE,
            request_interval_ms: constants::DEFAULT_REQUEST_INTERVAL_MS,
            request_timeout_secs: constants::DEFAULT_REQUEST_TIMEOUT_SECS,

            max_cache_entries: constants::DEFAULT_MAX_CACHE_ENTRIES,
            cache_save_debounce_ms: constants::CACHE_SAVE_DEBOUNCE_MS,

            reply_preset_id: constants::RANDOM_PRESET_ID.to_string(),
            reply_extra_instruction: String::new(),
            system_prompt_translate: constants::DEFAULT_SYSTEM_PROMPT_TRANSLATE.to_string(),
            system_prompt_reply: constants::DEFAULT_SYSTEM_PROMPT_REPLY.to_string(),
        }
    }
}

impl Settings {
    /// 切换服务商；非自定义服务商会带上预设的接口地址和模型
    pub fn apply_provider_preset(&mut self, provider: Provider) {
        self.provider = provider;
        if let Some((endpoint, model)) = provider.preset() {
            self.api_endpoint = endpoint.to_string();
            self.model = model.to_string();
        }
    }

    /// 把数值字段收敛到允许范围，并清理文本字段
    pub fn clamped(mut self) -> Self {
        let defaults = Settings::default();

        self.target_language = self.target_language.trim().to_string();
        if self.target_language.is_empty() {
            self.target_language = defaults.target_language;
        }
        self.model = self.model.trim().to_string();
        self.api_endpoint = self.api_endpoint.trim().to_string();
        self.api_key = self.api_key.trim().to_string();
        self.reply_preset_id = self.reply_preset_id.trim().to_lowercase();
        if self.reply_preset_id.is_empty() {
            self.reply_preset_id = defaults.reply_preset_id;
        }
        self.reply_extra_instruction =
            crate::translation::pipeline::sanitize_text(&self.reply_extra_instruction);

        let (lo, hi) = constants::CONTEXT_SIZE_RANGE;
        self.context_size = self.context_size.clamp(lo, hi);

        let (lo, hi) = constants::TEMPERATURE_RANGE;
        self.temperature = if self.temperature.is_finite() {
            self.temperature.clamp(lo, hi)
        } else {
            defaults.temperature
        };

        let (lo, hi) = constants::REQUEST_INTERVAL_RANGE_MS;
        self.request_interval_ms = self.request_interval_ms.clamp(lo, hi);

        let (lo, hi) = constants::CACHE_ENTRIES_RANGE;
        self.max_cache_entries = self.max_cache_entries.clamp(lo, hi);

        let (lo, hi) = constants::REQUEST_TIMEOUT_RANGE_SECS;
        self.request_timeout_secs = self.request_timeout_secs.clamp(lo, hi);

        self
    }

    /// 发起请求前的校验
    pub fn validate(&self) -> TranslationResult<()> {
        if self.api_endpoint.is_empty() || self.model.is_empty() {
            return Err(TranslationError::ConfigError("缺少接口地址或模型".to_string()));
        }

        url::Url::parse(&self.api_endpoint).map_err(|e| {
            TranslationError::ConfigError(format!("接口地址无效 {}: {}", self.api_endpoint, e))
        })?;

        Ok(())
    }

    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cache_save_debounce(&self) -> Duration {
        Duration::from_millis(self.cache_save_debounce_ms)
    }

    /// 应用环境变量覆盖
    pub fn apply_env_overrides(&mut self) {
        fn apply<T, V: EnvVar<T>>(target: &mut T) {
            match V::lookup() {
                Ok(Some(value)) => *target = value,
                Ok(None) => {}
                Err(e) => tracing::warn!("忽略无效的环境变量: {}", e),
            }
        }

        apply::<_, provider::ApiEndpoint>(&mut self.api_endpoint);
        apply::<_, provider::ApiKey>(&mut self.api_key);
        apply::<_, provider::Model>(&mut self.model);
        apply::<_, provider::RequestIntervalMs>(&mut self.request_interval_ms);
        apply::<_, translation::TargetLang>(&mut self.target_language);
        apply::<_, translation::AutoTranslate>(&mut self.auto_translate);
        apply::<_, storage::CacheCapacity>(&mut self.max_cache_entries);
    }

    /// 用于展示的副本，API 密钥被遮盖
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.api_key.is_empty() {
            let tail: String = {
                let chars: Vec<char> = copy.api_key.chars().collect();
                chars[chars.len().saturating_sub(4)..].iter().collect()
            };
            copy.api_key = format!("****{}", tail);
        }
        copy
    }
}

/// 设置管理器
pub struct ConfigManager {
    store: Arc<dyn PersistentStore>,
    config_path: Option<PathBuf>,
    read_env: bool,
}

impl ConfigManager {
    /// 创建新的配置管理器，配置文件按 `CONFIG_PATHS` 顺序查找
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self {
            store,
            config_path: None,
            read_env: true,
        }
    }

    /// 使用指定的配置文件
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// 不读取环境变量和 .env 文件
    pub fn without_env(mut self) -> Self {
        self.read_env = false;
        self
    }

    /// 加载设置
    pub fn load(&self) -> Settings {
        let mut merged = match serde_json::to_value(Settings::default()) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("序列化默认设置失败: {}", e);
                return Settings::default();
            }
        };

        if let Some(path) = self.resolve_config_path() {
            match Self::read_config_file(&path) {
                Ok(layer) => {
                    tracing::info!("加载配置文件: {}", path.display());
                    merge_layer(&mut merged, layer);
                }
                Err(e) => tracing::warn!("配置文件无效，已忽略 {}: {}", path.display(), e),
            }
        }

        if let Some(raw) = self.store.get(constants::SETTINGS_STORE_KEY) {
            match serde_json::from_str::<Value>(&raw) {
                Ok(layer) => merge_layer(&mut merged, layer),
                Err(e) => tracing::warn!("已保存的设置损坏，已忽略: {}", e),
            }
        }

        let mut settings = match serde_json::from_value::<Settings>(merged) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("设置字段类型错误，使用默认设置: {}", e);
                Settings::default()
            }
        };

        if self.read_env {
            Self::load_dotenv();
            settings.apply_env_overrides();
        }

        let settings = settings.clamped();
        tracing::debug!(
            "设置已加载: 模型 {}，目标语言 {}",
            settings.model,
            settings.target_language
        );
        settings
    }

    /// 保存设置，返回实际保存的（收敛后的）设置
    pub fn save(&self, settings: Settings) -> TranslationResult<Settings> {
        let settings = settings.clamped();
        let raw = serde_json::to_string(&settings)?;
        self.store.set(constants::SETTINGS_STORE_KEY, &raw)?;
        tracing::info!("设置已保存");
        Ok(settings)
    }

    /// 生成示例配置文件
    pub fn generate_example_config<P: AsRef<Path>>(path: P) -> TranslationResult<()> {
        let content = toml::to_string_pretty(&Settings::default())?;
        std::fs::write(path.as_ref(), content).map_err(|e| {
            TranslationError::ConfigError(format!("写入配置文件失败: {}", e))
        })?;
        Ok(())
    }

    fn resolve_config_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            return Some(path.clone());
        }

        constants::CONFIG_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists())
    }

    fn read_config_file(path: &Path) -> TranslationResult<Value> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TranslationError::ConfigError(format!("读取配置文件失败: {}", e)))?;

        if path.extension().map_or(false, |ext| ext == "json") {
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(toml::from_str(&content)?)
        }
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::debug!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }
}

/// 只合并对象的顶层键，非对象层被忽略
fn merge_layer(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                if !value.is_null() {
                    base.insert(key, value);
                }
            }
        }
        (_, other) => tracing::warn!("设置层不是对象，已忽略: {}", other),
    }
}
