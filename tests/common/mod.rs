// 集成测试公共模块
//
// 提供脚本化的模型服务商、记录型输出端和消息样例

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use chat_translator::translation::{
    ChatMessage, CompletionProvider, CompositionSink, Delivery, MemoryStore, MessageLog,
    MessageRecord, ProviderConfig, Settings, StatusLevel, StatusReport, StatusSink,
    TranslationError, TranslationResult, TranslationService, TranslationSink,
};

/// 预先安排好的一次响应
pub enum Scripted {
    Text(String),
    Fail(TranslationError),
    Delayed(Duration, String),
}

/// 服务商收到的一次调用
#[derive(Debug, Clone)]
pub struct ProviderCall {
    pub at: Instant,
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

impl ProviderCall {
    pub fn user_prompt(&self) -> &str {
        self.messages.last().map(|m| m.content.as_str()).unwrap_or("")
    }
}

/// 脚本化的模型服务商
///
/// 脚本用完后按 `译文: T(<原文>)` 的形式回显待翻译内容。
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<ProviderCall>>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_text(&self, text: &str) {
        self.script.lock().unwrap().push_back(Scripted::Text(text.to_string()));
    }

    pub fn push_error(&self, error: TranslationError) {
        self.script.lock().unwrap().push_back(Scripted::Fail(error));
    }

    pub fn push_delayed(&self, delay: Duration, text: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Delayed(delay, text.to_string()));
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, config: &ProviderConfig, messages: &[ChatMessage]) -> TranslationResult<String> {
        self.calls.lock().unwrap().push(ProviderCall {
            at: Instant::now(),
            model: config.model.clone(),
            messages: messages.to_vec(),
        });

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Text(text)) => Ok(text),
            Some(Scripted::Fail(error)) => Err(error),
            Some(Scripted::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            None => Ok(format!("译文: T({})", source_text(messages))),
        }
    }
}

/// 从翻译提示词中取出待翻译内容
pub fn source_text(messages: &[ChatMessage]) -> String {
    let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or("");
    let mut lines = prompt.lines().skip_while(|line| *line != "待翻译内容：");
    lines.next();
    lines.next().unwrap_or("").to_string()
}

/// 记录所有送达的译文
#[derive(Default)]
pub struct RecordingTranslations {
    deliveries: Mutex<Vec<Delivery>>,
}

impl RecordingTranslations {
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }
}

impl TranslationSink for RecordingTranslations {
    fn deliver(&self, delivery: Delivery) {
        self.deliveries.lock().unwrap().push(delivery);
    }
}

/// 记录所有状态提示
#[derive(Default)]
pub struct RecordingStatus {
    reports: Mutex<Vec<StatusReport>>,
}

impl RecordingStatus {
    pub fn messages(&self) -> Vec<String> {
        self.reports.lock().unwrap().iter().map(|r| r.message.clone()).collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.level == StatusLevel::Error)
            .map(|r| r.message.clone())
            .collect()
    }
}

impl StatusSink for RecordingStatus {
    fn report(&self, report: StatusReport) {
        self.reports.lock().unwrap().push(report);
    }
}

/// 可以配置为拒绝写入的输入框
pub struct RecordingComposer {
    accept: bool,
    attempts: Mutex<Vec<String>>,
}

impl RecordingComposer {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self {
            accept: true,
            attempts: Mutex::new(Vec::new()),
        })
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            accept: false,
            attempts: Mutex::new(Vec::new()),
        })
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

impl CompositionSink for RecordingComposer {
    fn insert(&self, text: &str) -> TranslationResult<()> {
        self.attempts.lock().unwrap().push(text.to_string());
        if self.accept {
            Ok(())
        } else {
            Err(TranslationError::ComposerError("输入框不可编辑".to_string()))
        }
    }
}

pub fn record(channel_id: &str, message_id: &str, author: &str, text: &str) -> MessageRecord {
    MessageRecord {
        channel_id: channel_id.to_string(),
        message_id: message_id.to_string(),
        author: author.to_string(),
        text: text.to_string(),
        sequence_index: 0,
    }
}

/// 频道 10 中的 `count` 条消息，id 从 1 开始，文本为 `message <id>`
pub fn conversation(count: usize) -> MessageLog {
    let log = MessageLog::new();
    for i in 1..=count {
        let author = if i % 2 == 0 { "Bob" } else { "Alice" };
        log.push(record("10", &i.to_string(), author, &format!("message {}", i)));
    }
    log
}

pub fn test_settings(interval_ms: u64) -> Settings {
    let mut settings = Settings::default();
    settings.api_endpoint = "http://127.0.0.1:9/v1/chat/completions".to_string();
    settings.model = "gpt".to_string();
    settings.target_language = "EN".to_string();
    settings.request_interval_ms = interval_ms;
    settings.context_size = 3;
    settings
}

/// 一套完整的测试环境
pub struct Harness {
    pub service: TranslationService,
    pub log: MessageLog,
    pub store: MemoryStore,
    pub provider: Arc<ScriptedProvider>,
    pub translations: Arc<RecordingTranslations>,
    pub status: Arc<RecordingStatus>,
}

impl Harness {
    pub fn new(log: MessageLog, settings: Settings) -> Self {
        Self::with_composer(log, settings, None)
    }

    pub fn with_composer(
        log: MessageLog,
        settings: Settings,
        composer: Option<Arc<RecordingComposer>>,
    ) -> Self {
        let store = MemoryStore::new();
        let provider = ScriptedProvider::new();
        let translations = Arc::new(RecordingTranslations::default());
        let status = Arc::new(RecordingStatus::default());

        let mut builder = TranslationService::builder(Arc::new(store.clone()), Arc::new(log.clone()))
            .settings(settings)
            .provider(provider.clone())
            .translation_sink(translations.clone())
            .status_sink(status.clone());
        if let Some(composer) = composer {
            builder = builder.composition_sink(composer);
        }

        Self {
            service: builder.build().unwrap(),
            log,
            store,
            provider,
            translations,
            status,
        }
    }
}
