//! 消息变化监听
//!
//! 外部把“出现了新消息”和“切换了频道”两类信号发到通道里，
//! 监听任务据此调用服务进行调度。它本身不持有任何状态。

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::translation::config::constants::INITIAL_SCAN_LIMIT;
use crate::translation::core::{ScheduleOutcome, StatusReport, TranslationService};
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::pipeline::MessageId;

/// 监听到的变化
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// 一条消息变得可见
    MessageAdded(MessageId),
    /// 切换到了另一个频道
    ChannelSwitched(String),
}

/// 监听任务结束时的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub events: usize,
    pub queued: usize,
    pub missing: usize,
}

/// 向监听任务发送信号
#[derive(Debug, Clone)]
pub struct WatcherHandle {
    sender: mpsc::UnboundedSender<WatchEvent>,
}

impl WatcherHandle {
    pub fn notify(&self, event: WatchEvent) -> TranslationResult<()> {
        self.sender.send(event).map_err(|_| TranslationError::QueueClosed)
    }

    pub fn message_added(&self, id: MessageId) -> TranslationResult<()> {
        self.notify(WatchEvent::MessageAdded(id))
    }

    pub fn channel_switched(&self, channel_id: impl Into<String>) -> TranslationResult<()> {
        self.notify(WatchEvent::ChannelSwitched(channel_id.into()))
    }
}

/// 变化监听器
pub struct ChangeWatcher {
    service: TranslationService,
    receiver: mpsc::UnboundedReceiver<WatchEvent>,
}

impl ChangeWatcher {
    /// 启动监听任务
    ///
    /// 启动时先扫描一次最近的消息。所有 `WatcherHandle` 被丢弃后任务结束。
    pub fn spawn(service: TranslationService) -> (WatcherHandle, JoinHandle<WatchSummary>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let watcher = ChangeWatcher { service, receiver };
        (WatcherHandle { sender }, tokio::spawn(watcher.run()))
    }

    async fn run(mut self) -> WatchSummary {
        let mut summary = WatchSummary::default();

        match self.service.scan_recent(INITIAL_SCAN_LIMIT, false) {
            Ok(scan) => summary.queued += scan.queued,
            Err(e) => tracing::warn!("初始扫描失败: {}", e),
        }
        self.service.report(StatusReport::info("已就绪"));

        while let Some(event) = self.receiver.recv().await {
            summary.events += 1;
            if let Err(e) = self.handle(&event, &mut summary) {
                tracing::warn!("处理 {:?} 失败: {}", event, e);
            }
        }

        tracing::debug!("监听结束: {:?}", summary);
        summary
    }

    fn handle(&self, event: &WatchEvent, summary: &mut WatchSummary) -> TranslationResult<()> {
        match event {
            WatchEvent::MessageAdded(id) => {
                let settings = self.service.settings();
                if !settings.enabled || !settings.auto_translate {
                    return Ok(());
                }

                let Some(record) = self.service.source().find(id) else {
                    tracing::debug!("消息来源中没有 {}", id);
                    summary.missing += 1;
                    return Ok(());
                };

                if self.service.schedule_translation(&record)? == ScheduleOutcome::Queued {
                    summary.queued += 1;
                }
            }
            WatchEvent::ChannelSwitched(channel_id) => {
                self.service.report(StatusReport::info(format!(
                    "频道已切换到 {}，正在扫描可见消息...",
                    channel_id
                )));
                let scan = self.service.scan_recent(INITIAL_SCAN_LIMIT, false)?;
                summary.queued += scan.queued;
            }
        }
        Ok(())
    }
}
