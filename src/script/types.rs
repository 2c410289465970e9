//! 请求、发言与剧本的数据模型

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 讨论氛围
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Atmosphere {
    RelaxedHumorous,
    SeriousDeep,
    HeatedDebate,
    WarmHealing,
}

impl Atmosphere {
    pub fn as_str(&self) -> &'static str {
        match self {
            Atmosphere::RelaxedHumorous => "relaxed_humorous",
            Atmosphere::SeriousDeep => "serious_deep",
            Atmosphere::HeatedDebate => "heated_debate",
            Atmosphere::WarmHealing => "warm_healing",
        }
    }

    /// prompt 中使用的中文描述
    pub fn label(&self) -> &'static str {
        match self {
            Atmosphere::RelaxedHumorous => "轻松幽默",
            Atmosphere::SeriousDeep => "严肃深度",
            Atmosphere::HeatedDebate => "激烈辩论",
            Atmosphere::WarmHealing => "温暖治愈",
        }
    }
}

/// 语言风格
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageStyle {
    Colloquial,
    Formal,
    Academic,
    Internet,
}

impl LanguageStyle {
    pub fn label(&self) -> &'static str {
        match self {
            LanguageStyle::Colloquial => "口语化",
            LanguageStyle::Formal => "正式",
            LanguageStyle::Academic => "学术",
            LanguageStyle::Internet => "网络流行语",
        }
    }
}

/// 角色深度设定（全部可选，空白视为未填写）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterDepth {
    #[serde(default)]
    pub backstory: Option<String>,
    #[serde(default)]
    pub backstory_impact: Option<String>,
    #[serde(default)]
    pub language_habits: Option<String>,
    #[serde(default)]
    pub catchphrases: Option<String>,
    #[serde(default)]
    pub speech_pace: Option<String>,
    #[serde(default)]
    pub core_values: Option<String>,
    #[serde(default)]
    pub inner_contradictions: Option<String>,
    #[serde(default)]
    pub hidden_motivation: Option<String>,
}

impl CharacterDepth {
    /// 已填写的字段：(中文标签, 内容)
    pub fn present_fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("关键经历", &self.backstory),
            ("经历的影响", &self.backstory_impact),
            ("语言习惯", &self.language_habits),
            ("口头禅", &self.catchphrases),
            ("语速特点", &self.speech_pace),
            ("核心价值观", &self.core_values),
            ("内在矛盾", &self.inner_contradictions),
            ("隐藏动机", &self.hidden_motivation),
        ]
        .into_iter()
        .filter_map(|(label, value)| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| (label, v))
        })
        .collect()
    }
}

/// 角色设定
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CharacterSpec {
    pub name: String,
    pub persona: String,
    pub core_viewpoint: String,
    #[serde(alias = "voice_description", default)]
    pub voice_descriptor: String,
    #[serde(alias = "tone_description", default)]
    pub tone_descriptor: String,
    #[serde(flatten)]
    pub depth: CharacterDepth,
}

impl CharacterSpec {
    pub fn new(name: &str, persona: &str, core_viewpoint: &str) -> Self {
        Self {
            name: name.to_string(),
            persona: persona.to_string(),
            core_viewpoint: core_viewpoint.to_string(),
            voice_descriptor: String::new(),
            tone_descriptor: String::new(),
            depth: CharacterDepth::default(),
        }
    }
}

/// 播客定制请求
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PodcastRequest {
    pub topic: String,
    #[serde(default)]
    pub title: Option<String>,
    pub atmosphere: Atmosphere,
    pub target_duration: String,
    pub language_style: LanguageStyle,
    pub characters: Vec<CharacterSpec>,
    #[serde(default)]
    pub background_materials: Option<String>,
}

impl PodcastRequest {
    /// 主题非空、2 到 5 个角色、角色名非空且不重复
    pub fn validate(&self) -> Result<(), String> {
        if self.topic.trim().is_empty() {
            return Err("topic must not be blank".to_string());
        }
        let n = self.characters.len();
        if !(2..=5).contains(&n) {
            return Err(format!("expected 2 to 5 characters, got {}", n));
        }
        let mut seen = HashSet::new();
        for c in &self.characters {
            let name = c.name.trim();
            if name.is_empty() {
                return Err("character name must not be blank".to_string());
            }
            if !seen.insert(name) {
                return Err(format!("duplicate character name: {}", name));
            }
        }
        Ok(())
    }

    pub fn cast_names(&self) -> Vec<String> {
        self.characters.iter().map(|c| c.name.trim().to_string()).collect()
    }

    /// 去掉空白后的背景资料
    pub fn material(&self) -> Option<&str> {
        self.background_materials
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }

    pub fn display_title(&self) -> String {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.topic)
            .to_string()
    }
}

/// 一条发言
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub character_name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
}

impl Turn {
    pub fn new(character_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            character_name: character_name.into(),
            content: content.into(),
            emotion: None,
        }
    }

    pub fn with_emotion(mut self, emotion: impl Into<String>) -> Self {
        self.emotion = Some(emotion.into());
        self
    }

    /// 字数 = 字符数
    pub fn word_count(&self) -> usize {
        self.content.chars().count()
    }
}

/// 结构规划中的一个阶段
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StagePlan {
    #[serde(default)]
    pub stage_number: u32,
    pub name: String,
    pub target_words: usize,
    #[serde(default)]
    pub objectives: Vec<String>,
    #[serde(default)]
    pub discussion_points: Vec<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub interaction_style: String,
}

/// 生成循环的结束原因
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TargetReached,
    NaturalClose,
    Exhausted,
    Interrupted,
}

/// 剧本元数据
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptMetadata {
    pub rag_enabled: bool,
    pub knowledge_sources_count: usize,
    pub knowledge_points_used: usize,
    pub source_summary: BTreeMap<String, usize>,
    pub analysis_used: bool,
    pub plan_stages: usize,
    pub iterations: usize,
    pub stop_reason: StopReason,
    pub generated_at: DateTime<Utc>,
}

/// 最终剧本
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PodcastScript {
    pub title: String,
    pub topic: String,
    pub dialogues: Vec<Turn>,
    /// 预估时长（秒）
    #[serde(default)]
    pub estimated_duration: Option<u32>,
    #[serde(default)]
    pub metadata: Option<ScriptMetadata>,
}

/// 按语速估算朗读时长（秒）
pub fn estimate_duration_secs(dialogues: &[Turn], words_per_minute: usize) -> u32 {
    if words_per_minute == 0 {
        return 0;
    }
    let chars: usize = dialogues.iter().map(Turn::word_count).sum();
    (chars * 60 / words_per_minute) as u32
}
