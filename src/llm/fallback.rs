//! 模板回退客户端（未配置 API Key 时使用，也用于演示与测试）
//!
//! 按 prompt 首行任务行中的模式标记（结构规划 / 素材分析 / 集体道别 / 结束语 / 继续对话 / 开场白）返回固定模板 JSON，
//! 角色、主题与下一位发言者从 prompt 的机器可读行中提取；继续对话模板按调用次数轮换。

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;

use crate::llm::{LlmClient, LlmError};
use crate::script::prompts::{
    CAST_LINE, MARKER_ANALYSIS, MARKER_CONTINUATION, MARKER_ENDING, MARKER_FAREWELL,
    MARKER_STRUCTURE, MATERIAL_FENCE, NEXT_SPEAKER_LINE, TOPIC_LINE, task_line,
};

const CONTINUATION_TEMPLATES: [(&str, &str); 5] = [
    (
        "{other}刚才说的这一点我挺认同的，不过我想补充一个细节：我身边有个朋友去年就因为{topic}换了工作方式，头三个月特别不适应，后来才慢慢找到节奏。",
        "这个例子很真实。那我追问一句，他最难熬的那段时间，到底卡在哪儿了？是工具不顺手，还是心态上转不过弯？",
    ),
    (
        "说实话，我对{other}的看法有一点保留。{topic}听起来很美好，但落到具体的人身上，成本和门槛往往被低估了，尤其是小城市的家庭。",
        "你提到门槛，我觉得这恰恰是关键。门槛高不可怕，可怕的是没人帮忙把它拆成一个个能迈过去的小台阶。",
    ),
    (
        "你看，我们聊到现在，其实绕不开一个问题：{topic}到底是替代了原来的东西，还是只是换了一种包装？{other}怎么看？",
        "我倾向于认为是重新分工。原来由一个人扛的事情被拆开了，有些交给技术，有些反而更需要人来做。",
    ),
    (
        "{other}这个分工的说法我很赞同。我们团队前年做过一次尝试，把流程拆成三段，效率确实上去了，但沟通成本一下子翻了一倍。",
        "翻了一倍？那后来是怎么解决的？这个经验我觉得对很多正在观望的听众会特别有参考价值。",
    ),
    (
        "其实回头看，关于{topic}最大的误区就是把它当成一次性的决定。它更像一个持续调整的过程，今天的答案明年可能就要改写。",
        "对，这个提醒很重要。与其追求一个标准答案，不如先想清楚自己最在意的是什么，再一步步去试。",
    ),
];

const GUEST_OPENERS: [&str; 4] = [
    "谢谢{host}的邀请。说实话，{topic}这个问题我琢磨了很久，我觉得核心在于它会实实在在地改变普通人的日常选择。",
    "很高兴来到这里。我的角度可能不太一样，我更关心{topic}背后那些没被看见的代价，这部分往往讨论得不够。",
    "大家好。我做这方面的工作有些年头了，在我看来，{topic}真正的难点不在技术，而在于人和习惯怎么跟上。",
    "谢谢邀请。我想先抛一个可能有点反直觉的观点：关于{topic}，我们今天的很多担心十年前也出现过。",
];

const FAREWELLS: [&str; 5] = [
    "再见，各位听众朋友！",
    "拜拜，我们下次聊！",
    "谢谢大家，再见！",
    "下次再聊，拜拜！",
    "期待和大家再见面！",
];

/// 模板回退客户端：不访问网络，输出稳定可解析的 JSON
#[derive(Debug, Default)]
pub struct TemplateFallbackClient {
    continuation_calls: AtomicUsize,
}

impl TemplateFallbackClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn line_value<'a>(prompt: &'a str, prefix: &str) -> Option<&'a str> {
        prompt.lines().find_map(|line| {
            let line = line.trim().trim_start_matches("- ").trim();
            line.strip_prefix(prefix).map(str::trim)
        })
    }

    fn cast(prompt: &str) -> Vec<String> {
        let cast: Vec<String> = Self::line_value(prompt, CAST_LINE)
            .map(|v| {
                v.split('、')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        if cast.is_empty() {
            vec!["主持人".to_string(), "嘉宾".to_string()]
        } else {
            cast
        }
    }

    fn topic(prompt: &str) -> String {
        Self::line_value(prompt, TOPIC_LINE)
            .filter(|t| !t.is_empty())
            .unwrap_or("有趣的话题")
            .to_string()
    }

    fn next_speaker(prompt: &str, cast: &[String]) -> String {
        Self::line_value(prompt, NEXT_SPEAKER_LINE)
            .map(|v| v.trim_matches(|c: char| c == '【' || c == '】').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| cast[0].clone())
    }

    fn dialogues(turns: Vec<(String, String, &str)>) -> String {
        let dialogues: Vec<_> = turns
            .into_iter()
            .map(|(name, content, emotion)| {
                json!({ "character_name": name, "content": content, "emotion": emotion })
            })
            .collect();
        json!({ "dialogues": dialogues }).to_string()
    }

    fn opening(cast: &[String], topic: &str) -> String {
        let host = cast[0].as_str();
        let guests = &cast[1..];
        let guest_list = if guests.is_empty() {
            "嘉宾".to_string()
        } else {
            guests.join("、")
        };
        let mut turns = vec![
            (
                host.to_string(),
                format!("大家好，欢迎收听本期节目，我是{}。今天我们要聊一个很多人都关心的话题：{}。", host, topic),
                "热情",
            ),
            (
                host.to_string(),
                format!("今天请到的嘉宾是{}，都在这个领域有不少一线经验，欢迎你们的到来！", guest_list),
                "友好",
            ),
            (
                host.to_string(),
                format!("我们先从最基本的问题开始：在你们看来，{}这件事的核心到底是什么？", topic),
                "好奇",
            ),
        ];
        for (i, guest) in guests.iter().enumerate() {
            let template = GUEST_OPENERS[i % GUEST_OPENERS.len()];
            turns.push((
                guest.clone(),
                template.replace("{host}", host).replace("{topic}", topic),
                "思考",
            ));
        }
        Self::dialogues(turns)
    }

    fn continuation(cast: &[String], topic: &str, speaker: &str, round: usize) -> String {
        let idx = cast.iter().position(|c| c == speaker).unwrap_or(0);
        let other = cast
            .get((idx + 1) % cast.len())
            .filter(|o| o.as_str() != speaker)
            .cloned()
            .unwrap_or_else(|| cast[0].clone());
        let (first, second) = CONTINUATION_TEMPLATES[round % CONTINUATION_TEMPLATES.len()];
        let fill = |t: &str| t.replace("{topic}", topic).replace("{other}", &other);
        Self::dialogues(vec![
            (speaker.to_string(), fill(first), "思考"),
            (other.clone(), fill(second), "好奇"),
        ])
    }

    fn ending(cast: &[String], topic: &str) -> String {
        let host = cast[0].clone();
        let guests = if cast.len() > 1 {
            cast[1..].join("、")
        } else {
            "各位嘉宾".to_string()
        };
        Self::dialogues(vec![
            (
                host.clone(),
                format!("今天聊下来，我自己收获很大。关于{}，我们既谈到了机会，也谈到了实实在在的挑战，最后都落回到每个人的真实需求上。", topic),
                "认真",
            ),
            (
                host,
                format!("感谢{}的精彩分享，也感谢大家收听，我们下期再见！", guests),
                "温暖",
            ),
        ])
    }

    fn farewell(cast: &[String]) -> String {
        let turns = cast
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), FAREWELLS[i % FAREWELLS.len()].to_string(), "开心"))
            .collect();
        Self::dialogues(turns)
    }

    fn analysis(prompt: &str) -> String {
        let material: String = prompt
            .split(MATERIAL_FENCE)
            .nth(1)
            .unwrap_or("")
            .trim()
            .chars()
            .take(60)
            .collect();
        json!({
            "main_thesis": format!("素材核心：{}", material),
            "key_arguments": ["素材中提到的核心观点", "相关领域的实践经验"],
            "supporting_data_or_examples": [format!("素材摘要：{}", material)],
            "potential_counterarguments": ["不同视角的质疑"],
            "discussion_questions": ["这个观点在实际中会遇到哪些挑战？"],
            "podcast_hooks": ["与听众日常相关的场景"]
        })
        .to_string()
    }
}

#[async_trait]
impl LlmClient for TemplateFallbackClient {
    fn name(&self) -> &str {
        "template-fallback"
    }

    async fn complete(&self, prompt: &str, _temperature: f32) -> Result<String, LlmError> {
        let cast = Self::cast(prompt);
        let topic = Self::topic(prompt);
        // 主题、角色设定与历史都可能含有标记字样，只看任务行
        let task = task_line(prompt);

        let content = if task.contains(MARKER_STRUCTURE) {
            json!({ "stages": [] }).to_string()
        } else if task.contains(MARKER_ANALYSIS) {
            Self::analysis(prompt)
        } else if task.contains(MARKER_FAREWELL) {
            Self::farewell(&cast)
        } else if task.contains(MARKER_ENDING) {
            Self::ending(&cast, &topic)
        } else if task.contains(MARKER_CONTINUATION) {
            let speaker = Self::next_speaker(prompt, &cast);
            let round = self.continuation_calls.fetch_add(1, Ordering::Relaxed);
            Self::continuation(&cast, &topic, &speaker, round)
        } else {
            Self::opening(&cast, &topic)
        };
        Ok(content)
    }
}
