//! 翻译服务核心实现
//!
//! `TranslationService` 把各个子系统串起来：
//!
//! 1. 新消息（来自监听器或手动扫描）先查缓存，命中直接送达
//! 2. 未命中时在 `PendingSet` 登记，同一个键同时只会有一个请求
//! 3. 任务进入 `RequestQueue`，轮到它时才收集上下文并调用模型
//! 4. 输出经过清理后写入缓存（防抖持久化），再交给 `TranslationSink`
//!
//! 队列中的任务出错只会上报状态，不影响后续任务；回复生成则把错误直接返回给调用方。
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chat_translator::translation::{MemoryStore, MessageLog, TranslationService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let log = MessageLog::new();
//! let service = TranslationService::builder(Arc::new(MemoryStore::new()), Arc::new(log.clone()))
//!     .build()?;
//!
//! service.scan_recent(60, true)?;
//! service.drain().await?;
//! println!("{:?}", service.stats());
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::translation::config::{constants, ConfigManager, Settings};
use crate::translation::error::{helpers, ErrorStats, TranslationError, TranslationResult};
use crate::translation::pipeline::{
    collect_latest, collect_window, normalize, sanitize_text, KeyState, MessageRecord,
    MessageSource, PendingGuard, PendingSet, QueueStats, RequestQueue,
};
use crate::translation::storage::{CacheKey, CacheStats, PersistentStore, TranslationCache};

use super::client::{CompletionClient, CompletionProvider, ProviderConfig};
use super::presets::{ReplyPreset, ReplyPresetSelector};
use super::prompt;
use super::sink::{
    CompositionSink, Delivery, LogStatusSink, LogTranslationSink, StatusReport, StatusSink,
    TranslationSink,
};

// ============================================================================
// 结果类型
// ============================================================================

/// 一次调度的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// 服务已停用或消息没有文本
    Skipped,
    /// 缓存命中，已直接送达
    Cached(String),
    /// 同一个键已经在处理中
    AlreadyPending,
    /// 已进入队列
    Queued,
}

/// 一次扫描的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub queued: usize,
    pub cached: usize,
    pub pending: usize,
    pub skipped: usize,
}

impl ScanSummary {
    fn record(&mut self, outcome: &ScheduleOutcome) {
        match outcome {
            ScheduleOutcome::Skipped => self.skipped += 1,
            ScheduleOutcome::Cached(_) => self.cached += 1,
            ScheduleOutcome::AlreadyPending => self.pending += 1,
            ScheduleOutcome::Queued => self.queued += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.queued + self.cached + self.pending + self.skipped
    }
}

/// 生成的回复及其使用的风格
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedReply {
    pub text: String,
    pub preset: ReplyPreset,
}

/// 某条消息在当前设置下的翻译状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationState {
    /// 尚未调度
    Idle,
    Queued,
    InFlight,
    Cached(String),
}

// ============================================================================
// 统计信息
// ============================================================================

/// 线程安全的服务计数器
#[derive(Debug, Default)]
pub struct ServiceStats {
    pub scheduled: AtomicUsize,
    pub cache_hits: AtomicUsize,
    pub deduplicated: AtomicUsize,
    pub translations_completed: AtomicUsize,
    pub translations_failed: AtomicUsize,
    pub replies_generated: AtomicUsize,
}

impl ServiceStats {
    fn inc(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ServiceStatsSnapshot {
        ServiceStatsSnapshot {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            translations_completed: self.translations_completed.load(Ordering::Relaxed),
            translations_failed: self.translations_failed.load(Ordering::Relaxed),
            replies_generated: self.replies_generated.load(Ordering::Relaxed),
            queue: QueueStats::default(),
            cache: CacheStats::default(),
            errors: ErrorStats::default(),
        }
    }
}

/// 统计信息快照
#[derive(Debug, Clone, Default)]
pub struct ServiceStatsSnapshot {
    pub scheduled: usize,
    pub cache_hits: usize,
    pub deduplicated: usize,
    pub translations_completed: usize,
    pub translations_failed: usize,
    pub replies_generated: usize,
    pub queue: QueueStats,
    pub cache: CacheStats,
    pub errors: ErrorStats,
}

// ============================================================================
// 服务构建
// ============================================================================

/// `TranslationService` 构建器
pub struct ServiceBuilder {
    store: Arc<dyn PersistentStore>,
    source: Arc<dyn MessageSource>,
    config: Option<ConfigManager>,
    settings: Option<Settings>,
    provider: Option<Arc<dyn CompletionProvider>>,
    translations: Arc<dyn TranslationSink>,
    composer: Option<Arc<dyn CompositionSink>>,
    status: Arc<dyn StatusSink>,
    selector: Option<ReplyPresetSelector>,
}

impl ServiceBuilder {
    /// 使用自定义的设置管理器（例如指定了配置文件）
    pub fn config_manager(mut self, config: ConfigManager) -> Self {
        self.config = Some(config);
        self
    }

    /// 直接指定初始设置，跳过加载
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn translation_sink(mut self, sink: Arc<dyn TranslationSink>) -> Self {
        self.translations = sink;
        self
    }

    pub fn composition_sink(mut self, sink: Arc<dyn CompositionSink>) -> Self {
        self.composer = Some(sink);
        self
    }

    pub fn status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.status = sink;
        self
    }

    pub fn preset_selector(mut self, selector: ReplyPresetSelector) -> Self {
        self.selector = Some(selector);
        self
    }

    /// 构建服务并启动请求队列，必须在 tokio 运行时中调用
    pub fn build(self) -> TranslationResult<TranslationService> {
        let config = self
            .config
            .unwrap_or_else(|| ConfigManager::new(Arc::clone(&self.store)));
        let settings = match self.settings {
            Some(settings) => settings.clamped(),
            None => config.load(),
        };

        let provider: Arc<dyn CompletionProvider> = match self.provider {
            Some(provider) => provider,
            None => Arc::new(CompletionClient::new()?),
        };

        let cache = TranslationCache::load_with_debounce(
            Arc::clone(&self.store),
            settings.max_cache_entries,
            settings.cache_save_debounce(),
        );
        let queue = RequestQueue::spawn(settings.request_interval(), Arc::clone(&self.status));

        tracing::info!(
            "翻译服务已启动: 模型 {}，目标语言 {}，请求间隔 {}ms",
            settings.model,
            settings.target_language,
            settings.request_interval_ms
        );

        Ok(TranslationService {
            inner: Arc::new(ServiceInner {
                settings: RwLock::new(settings),
                config,
                cache,
                queue,
                pending: PendingSet::new(),
                provider,
                selector: Mutex::new(self.selector.unwrap_or_default()),
                source: self.source,
                translations: self.translations,
                composer: self.composer,
                status: self.status,
                stats: ServiceStats::default(),
                errors: Mutex::new(ErrorStats::default()),
            }),
        })
    }
}

// ============================================================================
// 服务
// ============================================================================

/// 翻译与回复服务
///
/// 克隆开销很小，所有克隆共享同一个队列、缓存和去重集合。
#[derive(Clone)]
pub struct TranslationService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    settings: RwLock<Settings>,
    config: ConfigManager,
    cache: TranslationCache,
    queue: RequestQueue,
    pending: PendingSet,
    provider: Arc<dyn CompletionProvider>,
    selector: Mutex<ReplyPresetSelector>,
    source: Arc<dyn MessageSource>,
    translations: Arc<dyn TranslationSink>,
    composer: Option<Arc<dyn CompositionSink>>,
    status: Arc<dyn StatusSink>,
    stats: ServiceStats,
    errors: Mutex<ErrorStats>,
}

impl TranslationService {
    pub fn builder(store: Arc<dyn PersistentStore>, source: Arc<dyn MessageSource>) -> ServiceBuilder {
        ServiceBuilder {
            store,
            source,
            config: None,
            settings: None,
            provider: None,
            translations: Arc::new(LogTranslationSink),
            composer: None,
            status: Arc::new(LogStatusSink),
            selector: None,
        }
    }

    /// 当前设置的副本
    pub fn settings(&self) -> Settings {
        self.inner.settings()
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.inner.cache
    }

    pub fn pending(&self) -> &PendingSet {
        &self.inner.pending
    }

    pub fn source(&self) -> &Arc<dyn MessageSource> {
        &self.inner.source
    }

    pub(crate) fn report(&self, report: StatusReport) {
        self.inner.status.report(report);
    }

    /// 为一条消息调度翻译
    ///
    /// 设置在调度时取快照，上下文则在任务真正执行时才收集。
    pub fn schedule_translation(&self, record: &MessageRecord) -> TranslationResult<ScheduleOutcome> {
        let inner = &self.inner;
        let settings = inner.settings();
        if !settings.enabled || sanitize_text(&record.text).is_empty() {
            return Ok(ScheduleOutcome::Skipped);
        }

        let key = cache_key(record, &settings);
        if let Some(text) = inner.cache.get(&key) {
            ServiceStats::inc(&inner.stats.cache_hits);
            inner.translations.deliver(Delivery {
                message: record.id(),
                text: text.clone(),
                from_cache: true,
            });
            return Ok(ScheduleOutcome::Cached(text));
        }

        let Some(guard) = inner.pending.try_register(&key) else {
            ServiceStats::inc(&inner.stats.deduplicated);
            return Ok(ScheduleOutcome::AlreadyPending);
        };

        // 登记前可能刚有任务写入缓存并释放了同一个键
        if let Some(text) = inner.cache.peek(&key) {
            drop(guard);
            ServiceStats::inc(&inner.stats.cache_hits);
            inner.translations.deliver(Delivery {
                message: record.id(),
                text: text.clone(),
                from_cache: true,
            });
            return Ok(ScheduleOutcome::Cached(text));
        }

        let task = Arc::clone(inner).translate(record.clone(), settings, guard);
        inner
            .queue
            .enqueue(format!("翻译消息 {}", record.message_id), task)?;
        ServiceStats::inc(&inner.stats.scheduled);
        Ok(ScheduleOutcome::Queued)
    }

    /// 调度消息来源末尾的若干条消息
    ///
    /// 服务停用，或自动翻译关闭且不是强制扫描时什么也不做。
    pub fn scan_recent(&self, limit: usize, force: bool) -> TranslationResult<ScanSummary> {
        let settings = self.settings();
        let mut summary = ScanSummary::default();
        if !settings.enabled || (!settings.auto_translate && !force) {
            return Ok(summary);
        }

        let messages = self.inner.source.messages();
        let start = messages.len().saturating_sub(limit.max(1));
        for record in &messages[start..] {
            let outcome = self.schedule_translation(record)?;
            summary.record(&outcome);
        }

        tracing::debug!("扫描完成: {:?}", summary);
        Ok(summary)
    }

    /// 按设置中的风格生成回复
    pub async fn generate_reply(&self, extra_instruction: Option<&str>) -> TranslationResult<GeneratedReply> {
        let preset_id = self.settings().reply_preset_id;
        self.generate_reply_with_preset(&preset_id, extra_instruction).await
    }

    /// 用指定风格生成回复
    ///
    /// 和翻译任务共用同一个队列与间隔限制，错误直接返回给调用方。
    pub async fn generate_reply_with_preset(
        &self,
        preset_id: &str,
        extra_instruction: Option<&str>,
    ) -> TranslationResult<GeneratedReply> {
        let inner = &self.inner;
        let settings = inner.settings();

        if let Err(e) = settings.validate() {
            inner.status.report(StatusReport::error("请先配置接口地址和模型"));
            return Err(inner.record_error(e));
        }

        let messages = inner.source.messages();
        let context = collect_latest(
            &messages,
            settings.context_size.max(constants::MIN_REPLY_CONTEXT),
        );
        if context.is_empty() {
            inner.status.report(StatusReport::error("未找到可见消息上下文"));
            return Err(inner.record_error(TranslationError::InvalidInput(
                "未找到可见消息上下文".to_string(),
            )));
        }

        let instruction = match extra_instruction.map(sanitize_text) {
            Some(text) if !text.is_empty() => text,
            _ => settings.reply_extra_instruction.clone(),
        };
        let preset = inner
            .selector
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .resolve(preset_id);
        let token = prompt::variation_token(&mut rand::thread_rng());
        let request = prompt::reply_messages(
            &settings.system_prompt_reply,
            &preset,
            &context,
            &instruction,
            &token,
        );

        inner.status.report(StatusReport::info("正在生成回复..."));
        let provider = Arc::clone(&inner.provider);
        let config = ProviderConfig::from(&settings);
        let raw = inner
            .queue
            .run("生成回复", async move { provider.complete(&config, &request).await })
            .await
            .map_err(|e| inner.record_error(e))?;

        let text = sanitize_text(&raw);
        if text.is_empty() {
            return Err(inner.record_error(TranslationError::EmptyResponse));
        }

        ServiceStats::inc(&inner.stats.replies_generated);
        inner
            .status
            .report(StatusReport::info(format!("回复已生成（{}）", preset.label)));
        Ok(GeneratedReply { text, preset })
    }

    /// 把回复交给输入框，失败不重试
    pub fn insert_reply(&self, text: &str) -> TranslationResult<()> {
        let inner = &self.inner;
        let text = sanitize_text(text);
        if text.is_empty() {
            inner.status.report(StatusReport::error("回复输出为空"));
            return Err(TranslationError::InvalidInput("回复输出为空".to_string()));
        }

        let Some(composer) = &inner.composer else {
            return Err(inner.record_error(TranslationError::ComposerError(
                "没有可用的输入框".to_string(),
            )));
        };

        match composer.insert(&text) {
            Ok(()) => {
                inner
                    .status
                    .report(StatusReport::info("回复已写入输入框，可直接编辑和发送"));
                Ok(())
            }
            Err(e) => {
                inner
                    .status
                    .report(StatusReport::error("写入失败，请手动复制回复内容"));
                Err(inner.record_error(e))
            }
        }
    }

    /// 清空缓存并立即写入空快照
    pub fn reset_cache(&self) -> TranslationResult<()> {
        self.inner.cache.reset()?;
        self.inner.status.report(StatusReport::info("已清空翻译缓存"));
        Ok(())
    }

    /// 保存设置，并让队列间隔、缓存容量和写入防抖立即生效
    pub fn save_settings(&self, settings: Settings) -> TranslationResult<Settings> {
        let inner = &self.inner;
        let saved = inner.config.save(settings)?;

        inner.queue.set_interval(saved.request_interval());
        inner.cache.resize(saved.max_cache_entries);
        inner.cache.set_save_debounce(saved.cache_save_debounce());
        *inner.settings.write().unwrap_or_else(|e| e.into_inner()) = saved.clone();

        inner.status.report(StatusReport::info("设置已保存"));
        Ok(saved)
    }

    /// 在当前设置下查询某条消息的翻译状态，不影响缓存的最近使用顺序
    pub fn translation_state(&self, record: &MessageRecord) -> TranslationState {
        let key = cache_key(record, &self.settings());
        if let Some(text) = self.inner.cache.peek(&key) {
            return TranslationState::Cached(text);
        }
        match self.inner.pending.state(&key) {
            Some(KeyState::Queued) => TranslationState::Queued,
            Some(KeyState::InFlight) => TranslationState::InFlight,
            None => TranslationState::Idle,
        }
    }

    pub fn stats(&self) -> ServiceStatsSnapshot {
        let inner = &self.inner;
        let mut snapshot = inner.stats.snapshot();
        snapshot.queue = inner.queue.stats();
        snapshot.cache = inner.cache.stats();
        snapshot.errors = inner.errors.lock().unwrap_or_else(|e| e.into_inner()).clone();
        snapshot
    }

    /// 等待此前提交的所有任务结束
    pub async fn drain(&self) -> TranslationResult<()> {
        self.inner.queue.drain().await
    }

    /// 停止队列并写入尚未落盘的缓存
    pub async fn shutdown(&self) {
        self.inner.queue.shutdown().await;
        self.inner.cache.flush();
        tracing::info!("翻译服务已停止");
    }
}

impl std::fmt::Debug for TranslationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationService")
            .field("cache", &self.inner.cache)
            .field("queue", &self.inner.queue)
            .field("pending", &self.inner.pending.len())
            .finish()
    }
}

impl ServiceInner {
    fn settings(&self) -> Settings {
        self.settings.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record_error(&self, error: TranslationError) -> TranslationError {
        helpers::log_error(&error);
        self.errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record_error(&error);
        error
    }

    /// 队列中的翻译任务，`guard` 在任务结束时释放
    async fn translate(
        self: Arc<Self>,
        record: MessageRecord,
        settings: Settings,
        guard: PendingGuard,
    ) -> TranslationResult<()> {
        guard.mark_in_flight();

        let result = self.request_translation(&record, &settings).await;
        let text = match result {
            Ok(text) => text,
            Err(e) => {
                ServiceStats::inc(&self.stats.translations_failed);
                return Err(self.record_error(e.with_context(format!("消息 {}", record.id()))));
            }
        };

        self.cache.set(guard.key(), text.clone());
        ServiceStats::inc(&self.stats.translations_completed);
        tracing::debug!("{} → cached", guard.key());

        self.translations.deliver(Delivery {
            message: record.id(),
            text,
            from_cache: false,
        });
        self.status.report(StatusReport::info(format!(
            "消息 {} 翻译完成",
            record.message_id
        )));
        Ok(())
    }

    async fn request_translation(&self, record: &MessageRecord, settings: &Settings) -> TranslationResult<String> {
        settings.validate()?;

        let messages = self.source.messages();
        let context = collect_window(&messages, &record.id(), settings.context_size);
        let request = prompt::translation_messages(
            &settings.system_prompt_translate,
            &settings.target_language,
            &context,
            &sanitize_text(&record.text),
        );

        let raw = self
            .provider
            .complete(&ProviderConfig::from(settings), &request)
            .await?;
        Ok(normalize(&raw, Some(&record.author)))
    }
}

fn cache_key(record: &MessageRecord, settings: &Settings) -> CacheKey {
    CacheKey::new(
        &record.channel_id,
        &record.message_id,
        &settings.target_language,
        &settings.model,
    )
}
