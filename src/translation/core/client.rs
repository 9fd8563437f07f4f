//! Chat Completion 客户端
//!
//! 请求体为 `{model, messages, temperature, stream: false}`，配置了密钥时附带 Bearer 认证。
//! 响应中 `choices[0].message.content` 可能是字符串，也可能是分段列表；
//! 两种形态都由 `MessageContent` 统一表示，取不到时再尝试顶层的 `output_text`。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::translation::config::Settings;
use crate::translation::error::{TranslationError, TranslationResult};

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// 发给模型的一条消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// 一次请求用到的服务商参数
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl From<&Settings> for ProviderConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            endpoint: settings.api_endpoint.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            timeout: settings.request_timeout(),
        }
    }
}

/// 模型服务商
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// 发送消息列表，返回模型输出的原始文本
    async fn complete(&self, config: &ProviderConfig, messages: &[ChatMessage]) -> TranslationResult<String>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<MessageContent>,
}

/// 消息内容：纯文本或分段列表
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
    Other(Value),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentPart {
    Text(String),
    Typed {
        #[serde(rename = "type", default)]
        kind: Option<String>,
        #[serde(default)]
        text: Option<String>,
    },
    Other(Value),
}

impl MessageContent {
    fn into_text(self) -> String {
        match self {
            MessageContent::Text(text) => text,
            MessageContent::Parts(parts) => parts.into_iter().filter_map(ContentPart::into_text).collect(),
            MessageContent::Other(_) => String::new(),
        }
    }
}

impl ContentPart {
    fn into_text(self) -> Option<String> {
        match self {
            ContentPart::Text(text) => Some(text),
            // 只拼接文本分段，图片等其他类型忽略
            ContentPart::Typed { kind, text } => match kind.as_deref() {
                None | Some("text") | Some("output_text") => text,
                Some(_) => None,
            },
            ContentPart::Other(_) => None,
        }
    }
}

/// 从响应中取出文本，取不到时返回 `None`
pub fn extract_completion_text(payload: &Value) -> Option<String> {
    let from_choice = CompletionResponse::deserialize(payload)
        .ok()
        .and_then(|response| response.choices.into_iter().next())
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .map(MessageContent::into_text)
        .filter(|text| !text.is_empty());

    from_choice
        .or_else(|| payload.get("output_text").and_then(Value::as_str).map(str::to_string))
        .filter(|text| !text.trim().is_empty())
}

/// 基于 reqwest 的 HTTP 客户端
#[derive(Debug, Clone)]
pub struct CompletionClient {
    http: Client,
}

impl CompletionClient {
    pub fn new() -> TranslationResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("chat-translator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TranslationError::ConfigError(format!("创建 HTTP 客户端失败: {}", e)))?;
        Ok(Self { http })
    }

    pub fn with_client(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl CompletionProvider for CompletionClient {
    async fn complete(&self, config: &ProviderConfig, messages: &[ChatMessage]) -> TranslationResult<String> {
        if config.endpoint.is_empty() || config.model.is_empty() {
            return Err(TranslationError::ConfigError("缺少接口地址或模型".to_string()));
        }

        let body = CompletionRequest {
            model: &config.model,
            messages,
            temperature: config.temperature,
            stream: false,
        };

        let mut request = self
            .http
            .post(&config.endpoint)
            .timeout(config.timeout)
            .json(&body);
        if !config.api_key.is_empty() {
            request = request.bearer_auth(&config.api_key);
        }

        tracing::debug!("请求 {} (模型 {}, {} 条消息)", config.endpoint, config.model, messages.len());
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(TranslationError::http_status(status.as_u16(), &text));
        }

        let payload: Value = serde_json::from_str(&text)
            .map_err(|_| TranslationError::InvalidResponse("接口返回的 JSON 无效".to_string()))?;

        extract_completion_text(&payload).ok_or(TranslationError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_string_content() {
        let payload = json!({"choices": [{"message": {"content": "Hello"}}]});
        assert_eq!(extract_completion_text(&payload).as_deref(), Some("Hello"));
    }

    #[test]
    fn test_list_of_parts_keeps_text_only() {
        let payload = json!({"choices": [{"message": {"content": [
            {"type": "text", "text": "Hel"},
            {"type": "image_url", "image_url": {"url": "x"}},
            "lo",
            {"text": "!"},
            42
        ]}}]});
        assert_eq!(extract_completion_text(&payload).as_deref(), Some("Hello!"));
    }

    #[test]
    fn test_output_text_fallback() {
        let payload = json!({"output_text": "fallback"});
        assert_eq!(extract_completion_text(&payload).as_deref(), Some("fallback"));

        let payload = json!({"choices": [{"message": {"content": ""}}], "output_text": "fallback"});
        assert_eq!(extract_completion_text(&payload).as_deref(), Some("fallback"));

        let payload = json!({"choices": "weird", "output_text": "fallback"});
        assert_eq!(extract_completion_text(&payload).as_deref(), Some("fallback"));
    }

    #[test]
    fn test_nothing_to_extract() {
        assert_eq!(extract_completion_text(&json!({"choices": []})), None);
        assert_eq!(extract_completion_text(&json!([1, 2])), None);
        assert_eq!(extract_completion_text(&json!({"choices": [{"message": {"content": "  "}}]})), None);
    }

    #[test]
    fn test_request_body_shape() {
        let messages = [ChatMessage::system("s"), ChatMessage::user("u")];
        let body = CompletionRequest {
            model: "gpt",
            messages: &messages,
            temperature: 0.5,
            stream: false,
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "model": "gpt",
                "messages": [{"role": "system", "content": "s"}, {"role": "user", "content": "u"}],
                "temperature": 0.5,
                "stream": false
            })
        );
    }
}
