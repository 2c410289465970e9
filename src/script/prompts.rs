//! Prompt 构建
//!
//! 每个 prompt 都带有模式标记与机器可读的「主题：」「角色列表：」行，模板回退客户端据此生成内容。
//! 标记之间互不包含；继续对话 prompt 中不会出现结束语 / 集体道别等字样。

use crate::analysis::MaterialAnalysis;
use crate::knowledge::context::truncate_chars;
use crate::knowledge::KnowledgeSnippet;
use crate::script::types::{CharacterSpec, PodcastRequest, StagePlan, Turn};

pub const MARKER_OPENING: &str = "开场白";
pub const MARKER_CONTINUATION: &str = "继续对话";
pub const MARKER_ENDING: &str = "结束语";
pub const MARKER_FAREWELL: &str = "集体道别";
pub const MARKER_STRUCTURE: &str = "结构规划";
pub const MARKER_ANALYSIS: &str = "素材分析";

pub const TOPIC_LINE: &str = "主题：";
pub const CAST_LINE: &str = "角色列表：";
pub const NEXT_SPEAKER_LINE: &str = "下一位发言者：";
pub const PROGRESS_LINE: &str = "当前进度：";
/// 素材分析 prompt 中包裹原始素材的分隔行
pub const MATERIAL_FENCE: &str = "\n---\n";

/// prompt 首行任务行；模式标记只在这一行中判定
pub fn task_line(prompt: &str) -> &str {
    prompt.lines().next().unwrap_or_default()
}

const OUTPUT_FORMAT: &str = r#"## 输出格式
只输出如下 JSON，不要输出其它文字：
{"dialogues": [{"character_name": "角色名", "content": "台词", "emotion": "情绪"}]}
台词中不要包含括号动作、语气说明或情绪标注，情绪只写在 emotion 字段。"#;

fn header_lines(request: &PodcastRequest) -> String {
    format!(
        "- {}{}\n- {}{}\n- 讨论氛围：{}\n- 语言风格：{}\n",
        TOPIC_LINE,
        request.topic.trim(),
        CAST_LINE,
        request.cast_names().join("、"),
        request.atmosphere.label(),
        request.language_style.label(),
    )
}

/// 渲染角色设定，只包含已填写的字段
pub fn render_character(c: &CharacterSpec) -> String {
    let mut out = format!("【{}】\n- 身份：{}\n- 核心观点：{}\n", c.name.trim(), c.persona.trim(), c.core_viewpoint.trim());
    for (label, value) in [("音色", c.voice_descriptor.trim()), ("语气", c.tone_descriptor.trim())] {
        if !value.is_empty() {
            out.push_str(&format!("- {}：{}\n", label, value));
        }
    }
    for (label, value) in c.depth.present_fields() {
        out.push_str(&format!("- {}：{}\n", label, value));
    }
    out
}

/// 知识片段：只展示可信度分级标记
pub fn render_knowledge(snippets: &[KnowledgeSnippet], max_chars: usize) -> String {
    snippets
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!("{}. {} {}\n", i + 1, s.tier.marker(), truncate_chars(&s.content, max_chars))
        })
        .collect()
}

fn render_history(history: &[Turn]) -> String {
    history
        .iter()
        .map(|t| format!("{}：{}\n", t.character_name, t.content))
        .collect()
}

/// 开场白 prompt：主持人自我介绍、介绍嘉宾、第一轮问答
pub fn opening_prompt(
    request: &PodcastRequest,
    knowledge: &[KnowledgeSnippet],
    analysis: Option<&MaterialAnalysis>,
) -> String {
    let host = request.cast_names().into_iter().next().unwrap_or_default();
    let mut prompt = format!(
        "# 任务：为播客生成{}\n\n## 基本信息\n{}- 主持人：{}\n\n## 角色设定\n",
        MARKER_OPENING,
        header_lines(request),
        host
    );
    for c in &request.characters {
        prompt.push_str(&render_character(c));
    }

    if !knowledge.is_empty() {
        prompt.push_str("\n## 背景知识（可以参考，不要逐字引用）\n");
        prompt.push_str(&render_knowledge(&knowledge[..knowledge.len().min(2)], 150));
    }
    if let Some(a) = analysis {
        prompt.push_str("\n## 素材要点（可以参考，不要逐字引用）\n");
        prompt.push_str(&format!("核心主张：{}\n", a.main_thesis));
        for arg in a.key_arguments.iter().take(2) {
            prompt.push_str(&format!("- {}\n", arg));
        }
        for hook in a.podcast_hooks.iter().take(1) {
            prompt.push_str(&format!("- 开场钩子：{}\n", hook));
        }
    }

    prompt.push_str(&format!(
        "\n## 要求\n\
         1. 生成 4 到 5 条发言\n\
         2. 主持人{}先自我介绍并引出主题，再逐一介绍嘉宾\n\
         3. 主持人提出第一个问题，嘉宾给出回应\n\
         4. 每个角色的说话方式符合其设定\n\n{}",
        host, OUTPUT_FORMAT
    ));
    prompt
}

/// 继续对话 prompt 的输入
pub struct ContinuationInput<'a> {
    pub request: &'a PodcastRequest,
    pub next_speaker: &'a str,
    pub history: &'a [Turn],
    pub knowledge: &'a [KnowledgeSnippet],
    pub stage: Option<&'a StagePlan>,
    pub current_words: usize,
    pub target_words: usize,
}

fn progress_hint(ratio: f64) -> &'static str {
    if ratio < 0.3 {
        "讨论初期：展开话题，让每位嘉宾充分说明自己的立场"
    } else if ratio < 0.7 {
        "讨论中段：进入观点交锋，鼓励不同意见正面碰撞"
    } else {
        "讨论后段：逐步收拢观点，但不要提前道别或感谢收听"
    }
}

/// 继续对话 prompt：1 到 3 条发言，必须先回应上一位发言者
pub fn continuation_prompt(input: &ContinuationInput<'_>) -> String {
    let request = input.request;
    let host = request.cast_names().into_iter().next().unwrap_or_default();
    let ratio = if input.target_words == 0 {
        1.0
    } else {
        input.current_words as f64 / input.target_words as f64
    };

    let mut prompt = format!(
        "# 任务：{}\n- {}{}/{}字\n\n## 基本信息\n{}- {}【{}】\n\n## 角色设定\n",
        MARKER_CONTINUATION,
        PROGRESS_LINE,
        input.current_words,
        input.target_words,
        header_lines(request),
        NEXT_SPEAKER_LINE,
        input.next_speaker
    );
    for c in &request.characters {
        prompt.push_str(&render_character(c));
    }

    prompt.push_str("\n## 最近的对话\n");
    prompt.push_str(&render_history(input.history));

    if let Some(stage) = input.stage {
        prompt.push_str(&format!("\n## 当前阶段：{}\n", stage.name));
        for o in &stage.objectives {
            prompt.push_str(&format!("- 目标：{}\n", o));
        }
        for p in &stage.discussion_points {
            prompt.push_str(&format!("- 讨论点：{}\n", p));
        }
    }

    if !input.knowledge.is_empty() {
        prompt.push_str("\n## 背景知识（可以参考，不要逐字引用）\n");
        prompt.push_str(&render_knowledge(input.knowledge, 200));
    }

    let previous = input
        .history
        .last()
        .map(|t| t.character_name.as_str())
        .unwrap_or(host.as_str());
    let role_direction = if input.next_speaker == host {
        "作为主持人：回应上一位发言，再抛出一个更深入的追问，或请另一位嘉宾接话"
    } else {
        "作为嘉宾：结合自己的立场和经历回应，可以举具体例子"
    };

    prompt.push_str(&format!(
        "\n## 互动规则\n\
         对话要像打乒乓球：{}的发言必须先回应上一位发言者【{}】的内容，\
         可以赞同并补充、部分赞同后转折、提出质疑或追问细节，禁止各说各话的独白。\n\
         - {}\n- {}\n\n\
         ## 要求\n生成 1 到 3 条发言，第一条由{}说。\n\n{}",
        input.next_speaker,
        previous,
        progress_hint(ratio),
        role_direction,
        input.next_speaker,
        OUTPUT_FORMAT
    ));
    prompt
}

/// 结束语 prompt：主持人两段发言，先总结再致谢
pub fn ending_prompt(request: &PodcastRequest, recent: &[Turn]) -> String {
    let host = request.cast_names().into_iter().next().unwrap_or_default();
    format!(
        "# 任务：为播客生成{}\n\n## 基本信息\n{}- 主持人：{}\n\n## 最近的对话\n{}\n\
         ## 要求\n\
         由主持人{}说两条发言：\n\
         1. 第一条总结本期讨论的关键观点\n\
         2. 第二条感谢嘉宾与听众\n\n{}",
        MARKER_ENDING,
        header_lines(request),
        host,
        render_history(recent),
        host,
        OUTPUT_FORMAT
    )
}

/// 集体道别 prompt：每位角色按顺序一句简短的告别
pub fn farewell_prompt(request: &PodcastRequest) -> String {
    format!(
        "# 任务：生成{}\n\n## 基本信息\n{}\n\
         ## 要求\n按角色列表顺序，每位角色各说一句简短、符合人设的告别语，不超过 15 个字。\n\n{}",
        MARKER_FAREWELL,
        header_lines(request),
        OUTPUT_FORMAT
    )
}

/// 结构规划 prompt：5 到 7 个阶段，字数之和等于目标
pub fn structure_prompt(request: &PodcastRequest, target_words: usize) -> String {
    format!(
        "# 任务：播客对话{}\n\n## 基本信息\n{}- 目标字数：{}\n- 目标时长：{}\n\n\
         ## 要求\n\
         把对话划分为 5 到 7 个阶段，各阶段 target_words 之和等于 {}。\n\
         participants 只能使用角色列表中的名字。\n\n\
         ## 输出格式\n只输出如下 JSON：\n\
         {{\"stages\": [{{\"stage_number\": 1, \"name\": \"阶段名\", \"target_words\": 100, \
         \"objectives\": [\"目标\"], \"discussion_points\": [\"讨论点\"], \
         \"participants\": [\"角色名\"], \"interaction_style\": \"互动方式\"}}]}}",
        MARKER_STRUCTURE,
        header_lines(request),
        target_words,
        request.target_duration,
        target_words
    )
}

/// 素材分析 prompt
pub fn analysis_prompt(material: &str) -> String {
    format!(
        "# 任务：{}\n\n你是播客内容顾问。请分析以下素材，提炼适合播客讨论的要点。\n\n## 素材{}{}{}\n\
         ## 输出格式\n只输出如下 JSON，所有列表至少一项：\n\
         {{\"main_thesis\": \"一句话核心主张\", \"key_arguments\": [\"关键论点\"], \
         \"supporting_data_or_examples\": [\"数据或案例\"], \"potential_counterarguments\": [\"反驳观点\"], \
         \"discussion_questions\": [\"讨论问题\"], \"podcast_hooks\": [\"开场钩子\"]}}",
        MARKER_ANALYSIS,
        MATERIAL_FENCE,
        material.trim(),
        MATERIAL_FENCE
    )
}
