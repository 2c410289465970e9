//! 舞台指示清理：移除 TTS 不应读出的情绪标注、括号动作、提示语与注释
//!
//! 规则反复应用直到文本不再变化，因此 strip_stage_directions 是幂等的；
//! 清理结果为空时返回去掉首尾空白的原文。

use std::sync::OnceLock;

use regex::{Captures, Regex};

const EMOTION_WORDS: &str = "开心|悲伤|激动|平静|愤怒|惊讶|温暖|严肃|幽默|思考|轻松|紧张|焦虑|兴奋|疑惑|好奇|友好|期待|感动|欣慰|满足|骄傲|自豪|羞愧|尴尬|无奈|无聊|困惑|迷茫|坚定|犹豫|担心|害怕|恐惧|厌恶|反感|冷漠|淡然|热情|激昂|喜悦|失望|沮丧|愧疚|感激|同情|厌烦|焦躁|急切|渴望|怀疑";

/// 单轮清理最多重复的次数
const MAX_PASSES: usize = 64;

/// 文本清理 trait
pub trait Sanitizer: Send + Sync {
    /// 移除舞台指示；emotion 存在时额外清理「以…的语气」类描述
    fn strip_stage_directions(&self, text: &str, emotion: Option<&str>) -> String;
}

struct Rule {
    re: Regex,
    replacement: &'static str,
}

fn rule(pattern: &str, replacement: &'static str) -> Rule {
    Rule {
        re: Regex::new(pattern).expect("stage direction pattern"),
        replacement,
    }
}

fn base_rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        let emo = EMOTION_WORDS;
        vec![
            // 代码块、分隔线、注释
            rule(r"(?s)```.*?```", ""),
            rule(r"(?m)^-{3,}$", ""),
            rule(r"(?m)(^|\s)//.*$", "${1}"),
            // 句末 / 句首 / 句中独立的情绪词
            rule(&format!(r"([。！？，；、])\s*(?:{})\s*$", emo), "${1}"),
            rule(&format!(r"^(?:{})\s+", emo), ""),
            rule(&format!(r"[\s。！？，；、](?:{})[\s。！？，；、]", emo), " "),
            // 时间标记 [00:10]
            rule(r"[\[(（]\d{1,2}:\d{2}[\])）]", ""),
            // 括号标注：（开心地）[激动]【思考】(whispers) <微笑>
            rule(r"[（(][\p{Han}a-zA-Z]+[地的]?[）)]", ""),
            rule(r"[\[【][\p{Han}a-zA-Z]+[\]】]", ""),
            rule(r"【[^】]*】", ""),
            rule(r"[\[(][a-zA-Z\s]+[\])]", ""),
            rule(r"<[^>]*>", ""),
            rule(r"\*[^*]+\*", ""),
            // 情绪标签与语气描述
            rule(r"情绪\s*[：:]\s*\p{Han}+", ""),
            rule(r"请用\p{Han}{1,8}?(?:的语气|语气|的口吻)(?:说|讲)?[：:]?\s*", ""),
            rule(r"[以用]\p{Han}{1,6}?的(?:语气|口吻|声音|方式|态度)\s*", ""),
            rule(r"带着\p{Han}{1,6}?(?:说|道|讲|问|答|表示|回应)[：:]?\s*", ""),
            rule(r"注意(?:语气|情绪)", ""),
            rule(r"(?m)^\p{Han}{1,4}[地的]\s*[，,]\s*", ""),
            rule(&format!(r"(?m)^(?:{})[：:]\s*", emo), ""),
            rule(
                &format!(
                    r"(^|[，。！？；\s])(?:{})[地的](说|讲|分享|表示|强调|提醒|回答|补充|开场|总结)",
                    emo
                ),
                "${1}${2}",
            ),
            rule(&format!(r"(?:{})[：:]\s*", emo), ""),
            rule(r"\p{Han}{1,4}地(?:说|说道|回答|讲述|问道|提到|强调|补充|感叹)[：:]?\s*", ""),
        ]
    })
}

fn emotion_rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![rule(
            r"[以用][^，。！？]{1,8}?[的地](?:语气|口吻|声音|方式)",
            "",
        )]
    })
}

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace pattern"))
}

fn repeated_punct() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"，{2,}|。{2,}|！{2,}|？{2,}|；{2,}").expect("punctuation pattern"))
}

fn apply(rules: &[Rule], text: String) -> String {
    rules.iter().fold(text, |acc, r| {
        r.re.replace_all(&acc, r.replacement).into_owned()
    })
}

fn single_pass(text: &str, with_emotion: bool) -> String {
    let mut out = apply(base_rules(), text.to_string());
    if with_emotion {
        out = apply(emotion_rules(), out);
    }
    let out = whitespace().replace_all(&out, " ");
    let out = repeated_punct().replace_all(&out, |caps: &Captures| {
        caps[0].chars().next().map(String::from).unwrap_or_default()
    });
    out.trim().to_string()
}

/// 基于正则规则的默认实现
#[derive(Debug, Default, Clone)]
pub struct StageDirectionSanitizer;

impl StageDirectionSanitizer {
    pub fn new() -> Self {
        Self
    }
}

impl Sanitizer for StageDirectionSanitizer {
    fn strip_stage_directions(&self, text: &str, emotion: Option<&str>) -> String {
        let with_emotion = emotion.map(|e| !e.trim().is_empty()).unwrap_or(false);
        let mut current = text.trim().to_string();
        for _ in 0..MAX_PASSES {
            let next = single_pass(&current, with_emotion);
            if next == current {
                break;
            }
            current = next;
        }
        if current.is_empty() {
            return text.trim().to_string();
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn clean(text: &str) -> String {
        StageDirectionSanitizer::new().strip_stage_directions(text, None)
    }

    #[test]
    fn test_bracket_annotations() {
        assert_eq!(clean("（开心地）今天天气真不错！"), "今天天气真不错！");
        assert_eq!(clean("[激动] 这太重要了，我们必须马上行动！"), "这太重要了，我们必须马上行动！");
        assert_eq!(clean("【思考】让我想想这个问题。"), "让我想想这个问题。");
        assert_eq!(clean("（whispers）这是一个秘密。"), "这是一个秘密。");
    }

    #[test]
    fn test_tags_and_time_marks() {
        assert_eq!(clean("今天<微笑>我想和大家分享一个观点。"), "今天我想和大家分享一个观点。");
        assert_eq!(clean("大家好！[00:10] 欢迎收听！"), "大家好！ 欢迎收听！");
        assert_eq!(clean("推荐一本书《未来简史》。"), "推荐一本书《未来简史》。");
    }

    #[test]
    fn test_emotion_labels() {
        assert_eq!(clean("开心：大家好！"), "大家好！");
        assert_eq!(clean("这件事影响很大。开心"), "这件事影响很大。");
        assert_eq!(clean("友好 大家好，欢迎收听"), "大家好，欢迎收听");
        assert_eq!(clean("情绪：激动 我们开始吧"), "我们开始吧");
    }

    #[test]
    fn test_tone_instructions() {
        assert_eq!(clean("请用平静的语气说：我们需要冷静下来。"), "我们需要冷静下来。");
        assert_eq!(clean("以温和的语气 我想补充一点"), "我想补充一点");
    }

    #[test]
    fn test_plain_text_untouched() {
        let text = "这个分工的说法我很赞同，效率确实上去了。";
        assert_eq!(clean(text), text);
    }

    #[test]
    fn test_all_annotation_returns_input() {
        assert_eq!(clean("  （开心）  "), "（开心）");
    }

    #[test]
    fn test_repeated_punctuation_collapsed() {
        assert_eq!(clean("真的吗？？？太好了！！"), "真的吗？太好了！");
    }

    proptest! {
        #[test]
        fn prop_idempotent(text in "\\PC{0,40}") {
            let s = StageDirectionSanitizer::new();
            let once = s.strip_stage_directions(&text, None);
            let twice = s.strip_stage_directions(&once, None);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_idempotent_with_emotion(text in "[（）【】开心地说以的语气，。 a-z]{0,30}") {
            let s = StageDirectionSanitizer::new();
            let once = s.strip_stage_directions(&text, Some("开心"));
            let twice = s.strip_stage_directions(&once, Some("开心"));
            prop_assert_eq!(once, twice);
        }
    }
}
