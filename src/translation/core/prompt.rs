//! 提示词组装

use rand::distributions::Alphanumeric;
use rand::Rng;

use super::client::ChatMessage;
use super::presets::ReplyPreset;
use crate::translation::pipeline::ContextLine;

const NO_CONTEXT: &str = "(No prior context)";

/// 把上下文渲染成编号列表：`1. [author] text`
pub fn render_context(context: &[ContextLine]) -> String {
    if context.is_empty() {
        return NO_CONTEXT.to_string();
    }

    context
        .iter()
        .enumerate()
        .map(|(index, line)| format!("{}. [{}] {}", index + 1, line.author, line.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 翻译请求
pub fn translation_messages(
    system_prompt: &str,
    target_language: &str,
    context: &[ContextLine],
    text: &str,
) -> Vec<ChatMessage> {
    let user_prompt = [
        format!("目标语言：{}", target_language),
        "对话上下文：".to_string(),
        render_context(context),
        "待翻译内容：".to_string(),
        text.to_string(),
        "只返回译文，不要解释，不要加说话人、括号标签、语言标签。".to_string(),
    ]
    .join("\n");

    vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)]
}

/// 回复请求
pub fn reply_messages(
    system_prompt: &str,
    preset: &ReplyPreset,
    context: &[ContextLine],
    extra_instruction: &str,
    variation_token: &str,
) -> Vec<ChatMessage> {
    let mut lines = vec![
        "Generate one chat reply from this context.".to_string(),
        format!("Style preset: {}", preset.label),
        format!("Style guidance: {}", preset.instruction),
        "Avoid repetitive templates and vary wording/sentence openings.".to_string(),
        format!("Variation token: {} (do not output this token).", variation_token),
        "Context:".to_string(),
        render_context(context),
    ];
    if !extra_instruction.is_empty() {
        lines.push(format!("Extra instruction: {}", extra_instruction));
    }
    lines.push("Output only reply text.".to_string());

    vec![ChatMessage::system(system_prompt), ChatMessage::user(lines.join("\n"))]
}

/// 6 位小写字母数字，让相同上下文的多次请求措辞不同
pub fn variation_token<R: Rng>(rng: &mut R) -> String {
    (0..6)
        .map(|_| char::from(rng.sample(Alphanumeric)).to_ascii_lowercase())
        .collect()
}
