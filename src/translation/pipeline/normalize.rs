//! 模型输出清理
//!
//! 模型有时会给译文套上代码块、加上“译文：”之类的标签，或者带上说话人前缀。
//! `normalize` 反复剥离这些外壳直到文本不再变化，因此对自己的输出再次调用不会有任何效果。

use std::sync::OnceLock;

use regex::Regex;

static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
static LABEL: OnceLock<Option<Regex>> = OnceLock::new();
static TAGS: OnceLock<Option<Regex>> = OnceLock::new();
static WHITESPACE: OnceLock<Option<Regex>> = OnceLock::new();

fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::error!("正则表达式无效 {}: {}", pattern, e);
            None
        }
    })
    .as_ref()
}

/// 合并连续空白并去掉首尾空白
pub fn sanitize_text(text: &str) -> String {
    match cached(&WHITESPACE, r"\s+") {
        Some(regex) => regex.replace_all(text, " ").trim().to_string(),
        None => text.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

/// 清理模型输出
///
/// 剥离后为空时返回只做过空白整理的原文。
pub fn normalize(text: &str, author: Option<&str>) -> String {
    let original = sanitize_text(text);
    let author = author.map(str::trim).filter(|name| !name.is_empty());

    let mut cleaned = original.clone();
    loop {
        let next = strip_once(&cleaned, author);
        if next.is_empty() {
            return original;
        }
        if next == cleaned {
            return cleaned;
        }
        cleaned = next;
    }
}

fn strip_once(text: &str, author: Option<&str>) -> String {
    let mut cleaned = text.to_string();

    if let Some(fence) = cached(&FENCE, r"(?s)^```(?:[A-Za-z0-9_+-]+)?\s*(.*?)\s*```$") {
        cleaned = fence.replace(&cleaned, "$1").trim().to_string();
    }
    if let Some(label) = cached(&LABEL, r"(?i)^(?:translation|translated text|译文|翻译)\s*[:：]\s*") {
        cleaned = label.replace(&cleaned, "").into_owned();
    }
    if let Some(tags) = cached(&TAGS, r"^(?:\[[^\]\r\n]{1,40}\]\s*)+") {
        cleaned = tags.replace(&cleaned, "").into_owned();
    }
    if let Some(author) = author {
        if let Some(rest) = strip_author(&cleaned, author) {
            cleaned = rest.to_string();
        }
    }

    sanitize_text(&cleaned)
}

/// 说话人前缀：`Author:`、`Author -` 或 `[Author]`，名字按字面、不区分大小写匹配
fn strip_author<'a>(text: &'a str, author: &str) -> Option<&'a str> {
    if let Some(rest) = text
        .strip_prefix('[')
        .and_then(|rest| strip_prefix_ignore_case(rest, author))
        .and_then(|rest| rest.strip_prefix(']'))
    {
        return Some(rest.trim_start());
    }

    let rest = strip_prefix_ignore_case(text, author)?.trim_start();
    let rest = rest.strip_prefix([':', '：', '-'])?;
    Some(rest.trim_start())
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut chars = text.chars();
    for expected in prefix.chars() {
        let actual = chars.next()?;
        if !actual.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    Some(chars.as_str())
}
