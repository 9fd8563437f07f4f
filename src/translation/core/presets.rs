//! 回复风格预设
//!
//! 目录里只有具体的风格；“随机”只是选择入口上的一个标记，永远不会作为结果返回。

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::translation::config::constants::RANDOM_PRESET_ID;

/// 一种回复风格
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyPreset {
    pub id: String,
    pub label: String,
    pub instruction: String,
}

impl ReplyPreset {
    pub fn new(id: &str, label: &str, instruction: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            instruction: instruction.to_string(),
        }
    }

    /// 目录为空时使用
    fn fallback() -> Self {
        Self::new(
            "fallback",
            "默认",
            "Write a natural chat reply aligned with the context.",
        )
    }
}

/// 内置风格目录
pub fn builtin_presets() -> Vec<ReplyPreset> {
    vec![
        ReplyPreset::new(
            "friendly_brief",
            "友好简短",
            "Friendly and casual tone. Keep it short: 1-2 concise sentences.",
        ),
        ReplyPreset::new(
            "warm_supportive",
            "温暖支持",
            "Empathetic and supportive tone. Acknowledge feelings before giving suggestion.",
        ),
        ReplyPreset::new(
            "playful_light",
            "轻松俏皮",
            "Light and playful tone with mild humor. Keep it natural, not exaggerated.",
        ),
        ReplyPreset::new(
            "professional_clear",
            "专业清晰",
            "Calm professional tone. Clear wording, polite, and to the point.",
        ),
        ReplyPreset::new(
            "curious_followup",
            "追问引导",
            "Use a curious tone and end with one short follow-up question.",
        ),
        ReplyPreset::new(
            "action_oriented",
            "行动建议",
            "Give practical next-step advice with one concrete suggestion.",
        ),
        ReplyPreset::new(
            "confident_direct",
            "自信直接",
            "Direct and confident tone. No fluff, no overexplaining.",
        ),
        ReplyPreset::new(
            "thoughtful_detail",
            "细节走心",
            "Thoughtful tone. Reference one concrete detail from context to avoid generic wording.",
        ),
    ]
}

/// 风格选择器，记住上一次选中的风格
#[derive(Debug)]
pub struct ReplyPresetSelector {
    presets: Vec<ReplyPreset>,
    last_picked: Option<String>,
    rng: StdRng,
}

impl Default for ReplyPresetSelector {
    fn default() -> Self {
        Self::new(builtin_presets())
    }
}

impl ReplyPresetSelector {
    pub fn new(presets: Vec<ReplyPreset>) -> Self {
        Self::with_rng(presets, StdRng::from_entropy())
    }

    /// 固定随机种子，便于复现
    pub fn with_seed(presets: Vec<ReplyPreset>, seed: u64) -> Self {
        Self::with_rng(presets, StdRng::seed_from_u64(seed))
    }

    fn with_rng(presets: Vec<ReplyPreset>, rng: StdRng) -> Self {
        // 目录中混入随机标记时将其剔除
        let presets = presets
            .into_iter()
            .filter(|preset| preset.id != RANDOM_PRESET_ID)
            .collect();
        Self {
            presets,
            last_picked: None,
            rng,
        }
    }

    pub fn presets(&self) -> &[ReplyPreset] {
        &self.presets
    }

    pub fn last_picked(&self) -> Option<&str> {
        self.last_picked.as_deref()
    }

    /// 解析风格 id
    ///
    /// 随机标记在具体风格中均匀选取，至少有两种风格时不会与上一次相同；
    /// 未知 id 回落到第一种风格。
    pub fn resolve(&mut self, preset_id: &str) -> ReplyPreset {
        let id = preset_id.trim().to_lowercase();
        let id = if id.is_empty() { RANDOM_PRESET_ID.to_string() } else { id };

        let picked = if id == RANDOM_PRESET_ID {
            self.pick_random()
        } else {
            self.presets
                .iter()
                .find(|preset| preset.id == id)
                .or_else(|| self.presets.first())
                .cloned()
                .unwrap_or_else(ReplyPreset::fallback)
        };

        self.last_picked = Some(picked.id.clone());
        picked
    }

    fn pick_random(&mut self) -> ReplyPreset {
        let last = self.last_picked.as_deref();
        let candidates: Vec<&ReplyPreset> = if self.presets.len() >= 2 {
            self.presets.iter().filter(|preset| Some(preset.id.as_str()) != last).collect()
        } else {
            self.presets.iter().collect()
        };

        if candidates.is_empty() {
            return ReplyPreset::fallback();
        }
        let index = self.rng.gen_range(0..candidates.len());
        candidates[index].clone()
    }
}
