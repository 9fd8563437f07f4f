//! 上下文收集
//!
//! 从按时间排序的消息序列中截取有界的上下文，供模型消歧义使用。
//! 这里的函数都是纯函数，找不到目标或没有内容时返回空列表而不是报错。

use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::translation::config::constants::{LATEST_TEXT_LIMIT, TRUNCATION_MARKER, WINDOW_TEXT_LIMIT};

/// 消息身份
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId {
    pub channel_id: String,
    pub message_id: String,
}

impl MessageId {
    pub fn new(channel_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            message_id: message_id.into(),
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel_id, self.message_id)
    }
}

/// 一条消息的快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub channel_id: String,
    pub message_id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub sequence_index: usize,
}

impl MessageRecord {
    pub fn id(&self) -> MessageId {
        MessageId::new(self.channel_id.clone(), self.message_id.clone())
    }

    pub fn is(&self, id: &MessageId) -> bool {
        self.channel_id == id.channel_id && self.message_id == id.message_id
    }
}

/// 上下文中的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextLine {
    pub author: String,
    pub text: String,
}

/// 消息来源
///
/// 按时间顺序提供消息，身份稳定。
pub trait MessageSource: Send + Sync {
    fn messages(&self) -> Vec<MessageRecord>;

    fn find(&self, id: &MessageId) -> Option<MessageRecord> {
        self.messages().into_iter().find(|record| record.is(id))
    }
}

/// 内存中只追加的消息序列
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    records: Arc<RwLock<Vec<MessageRecord>>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一条消息，`sequence_index` 由日志分配
    pub fn push(&self, mut record: MessageRecord) -> MessageId {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        record.sequence_index = records.len();
        let id = record.id();
        records.push(record);
        id
    }

    pub fn extend<I: IntoIterator<Item = MessageRecord>>(&self, records: I) {
        for record in records {
            self.push(record);
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MessageSource for MessageLog {
    fn messages(&self) -> Vec<MessageRecord> {
        self.records.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// 目标消息之前的上下文窗口
///
/// 最多取 `max_count` 条（至少 1 条）紧邻目标之前的消息，跳过空文本，
/// 文本超过 300 字符时截断。目标不在序列中时返回空。
pub fn collect_window(messages: &[MessageRecord], target: &MessageId, max_count: usize) -> Vec<ContextLine> {
    let Some(position) = messages.iter().position(|record| record.is(target)) else {
        return Vec::new();
    };

    let start = position.saturating_sub(max_count.max(1));
    messages[start..position]
        .iter()
        .filter_map(|record| context_line(record, WINDOW_TEXT_LIMIT))
        .collect()
}

/// 整个序列末尾的若干条消息，文本上限 360 字符
pub fn collect_latest(messages: &[MessageRecord], max_count: usize) -> Vec<ContextLine> {
    let start = messages.len().saturating_sub(max_count);
    messages[start..]
        .iter()
        .filter_map(|record| context_line(record, LATEST_TEXT_LIMIT))
        .collect()
}

/// 按字符截断，超出时追加截断标记
pub fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_index, _)) => format!("{}{}", &text[..byte_index], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

fn context_line(record: &MessageRecord, limit: usize) -> Option<ContextLine> {
    let text = super::normalize::sanitize_text(&record.text);
    if text.is_empty() {
        return None;
    }

    let author = super::normalize::sanitize_text(&record.author);
    Some(ContextLine {
        author: if author.is_empty() { "Unknown".to_string() } else { author },
        text: truncate(&text, limit),
    })
}
