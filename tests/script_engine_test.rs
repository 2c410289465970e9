//! 剧本生成引擎集成测试

use std::sync::Arc;

use async_trait::async_trait;
use podscript::analysis::{MaterialAnalysis, MaterialAnalyzer};
use podscript::core::ScriptError;
use podscript::knowledge::{InMemoryKnowledge, KnowledgeError, KnowledgeProvider, RawKnowledge};
use podscript::llm::{MockLlmClient, TemplateFallbackClient};
use podscript::script::prompts::{
    MARKER_CONTINUATION, MARKER_ENDING, MARKER_FAREWELL, MARKER_OPENING, MARKER_STRUCTURE,
};
use podscript::script::{
    GenerationSettings, PodcastRequest, ScriptEngine, ScriptEvent, StopReason, DEFAULT_CLOSING_LINE,
    DEFAULT_FAREWELL_LINE,
};
use tokio::sync::mpsc;

fn request(topic: &str, duration: &str, material: Option<&str>) -> PodcastRequest {
    let mut req: PodcastRequest = serde_json::from_value(serde_json::json!({
        "topic": topic,
        "atmosphere": "relaxed_humorous",
        "target_duration": duration,
        "language_style": "colloquial",
        "characters": [
            {"name": "李老师", "persona": "教育研究者", "core_viewpoint": "技术只是工具",
             "voice_description": "沉稳", "tone_description": "平和"},
            {"name": "王同学", "persona": "大学二年级学生", "core_viewpoint": "线上学习更自由",
             "voice_description": "清亮", "tone_description": "活泼"}
        ]
    }))
    .unwrap();
    req.background_materials = material.map(String::from);
    req
}

fn cast() -> Vec<String> {
    vec!["李老师".to_string(), "王同学".to_string()]
}

fn dialogues_json(turns: &[(&str, &str)]) -> String {
    let list: Vec<_> = turns
        .iter()
        .map(|(name, content)| serde_json::json!({"character_name": name, "content": content}))
        .collect();
    serde_json::json!({ "dialogues": list }).to_string()
}

fn short_opening() -> String {
    dialogues_json(&[
        ("李老师", "大家好，我是李老师。"),
        ("李老师", "今天请来了王同学。"),
        ("王同学", "大家好，很高兴来。"),
        ("李老师", "我们先聊聊体验吧。"),
    ])
}

struct BrokenKnowledge;

#[async_trait]
impl KnowledgeProvider for BrokenKnowledge {
    async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<RawKnowledge>, KnowledgeError> {
        Err(KnowledgeError::Search("vector store unreachable".to_string()))
    }
}

struct BrokenAnalyzer;

#[async_trait]
impl MaterialAnalyzer for BrokenAnalyzer {
    async fn analyze(&self, _material: &str) -> Result<MaterialAnalysis, ScriptError> {
        Err(ScriptError::AnalysisFailure("quota exceeded".to_string()))
    }
}

#[tokio::test]
async fn test_end_to_end_with_template_client() {
    let engine = ScriptEngine::builder(Arc::new(TemplateFallbackClient::new())).build();
    let script = engine
        .generate(&request("在线教育的未来", "2分钟", None))
        .await
        .unwrap();

    let names = cast();
    let d = &script.dialogues;
    assert!(d.len() >= 8, "only {} dialogues", d.len());
    assert!(d.iter().all(|t| names.contains(&t.character_name)));
    assert_eq!(script.title, "在线教育的未来");

    // 开场至少 4 条，由主持人开头
    assert_eq!(d[0].character_name, "李老师");
    assert!(d[..4].iter().any(|t| t.character_name == "王同学"));

    // 结束语两段主持人，随后按角色顺序道别
    let n = d.len();
    assert_eq!(d[n - 4].character_name, "李老师");
    assert_eq!(d[n - 3].character_name, "李老师");
    assert!(d[n - 3].content.contains("下期再见"));
    assert_eq!(d[n - 2].character_name, "李老师");
    assert_eq!(d[n - 1].character_name, "王同学");

    let meta = script.metadata.unwrap();
    assert!(!meta.rag_enabled);
    assert_eq!(meta.plan_stages, 6);
    assert_eq!(meta.stop_reason, StopReason::TargetReached);
    assert!(meta.iterations >= 1);
    assert!(script.estimated_duration.unwrap() > 0);
}

#[tokio::test]
async fn test_template_client_with_marker_words_in_topic() {
    for topic in ["城市结构规划的未来", "如何写好演讲的开头与结束语", "毕业典礼上的集体道别", "素材分析入门"] {
        let engine = ScriptEngine::builder(Arc::new(TemplateFallbackClient::new())).build();
        let script = engine.generate(&request(topic, "2分钟", None)).await.unwrap();
        let d = &script.dialogues;
        assert!(d.len() >= 8, "topic {}: only {} dialogues", topic, d.len());
        assert_eq!(d[0].character_name, "李老师");
        assert!(d[0].content.contains(topic), "topic {}: opening was {}", topic, d[0].content);
        assert_eq!(script.metadata.unwrap().stop_reason, StopReason::TargetReached);
    }
}

#[tokio::test]
async fn test_knowledge_and_analysis_failures_degrade() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = ScriptEngine::builder(Arc::new(TemplateFallbackClient::new()))
        .knowledge(Arc::new(BrokenKnowledge))
        .analyzer(Arc::new(BrokenAnalyzer))
        .event_sink(tx)
        .build();
    let script = engine
        .generate(&request("在线教育的未来", "2分钟", Some("一份关于在线教育的调研报告")))
        .await
        .unwrap();

    let meta = script.metadata.unwrap();
    assert!(!meta.rag_enabled);
    assert!(!meta.analysis_used);
    assert_eq!(meta.knowledge_sources_count, 0);
    assert!(script.dialogues.len() >= 8);

    let mut degraded = 0;
    let mut finished = false;
    while let Ok(ev) = rx.try_recv() {
        match ev {
            ScriptEvent::Recovery { action, .. } if action == "Degrade" => degraded += 1,
            ScriptEvent::Finished { .. } => finished = true,
            _ => {}
        }
    }
    assert_eq!(degraded, 2);
    assert!(finished);
}

#[tokio::test]
async fn test_knowledge_reaches_opening_prompt() {
    let store = InMemoryKnowledge::default();
    store.add(RawKnowledge::new(
        "在线教育让偏远地区的学生也能听到名校老师的课程，覆盖人数逐年增长，平台在课程质量评估、学习效果追踪和师生互动方面也在持续改进。",
        "edu-report.gov",
    ));
    let mock = Arc::new(MockLlmClient::new().with_template_fallback());
    let engine = ScriptEngine::builder(mock.clone())
        .knowledge(Arc::new(store))
        .build();
    let script = engine
        .generate(&request("在线教育的未来", "2分钟", None))
        .await
        .unwrap();

    let meta = script.metadata.unwrap();
    assert!(meta.rag_enabled);
    assert_eq!(meta.knowledge_sources_count, 1);
    assert_eq!(meta.source_summary.get("edu-report.gov"), Some(&1));

    let opening = mock
        .prompts()
        .into_iter()
        .find(|p| p.contains(MARKER_OPENING))
        .unwrap();
    assert!(opening.contains("[高可信]"));
    assert!(opening.contains("偏远地区"));
    assert!(!opening.contains("edu-report.gov"));
}

#[tokio::test]
async fn test_repeated_turn_dropped_and_natural_close() {
    let opening = dialogues_json(&[
        ("李老师", "欢迎收听本期节目，今天我们来聊一聊在线教育这个话题。"),
        ("李老师", "今天的嘉宾是王同学，他正在读大学二年级。"),
        ("王同学", "大家好，我这两年上过不少网课，体验可以说是又爱又恨。"),
        ("李老师", "那我们先从最让你头疼的地方说起吧，网课到底难在哪？"),
    ]);
    let duplicate = dialogues_json(&[("王同学", "那我们先从最让你头疼的地方说起吧，网课到底难在哪？")]);
    let closing = dialogues_json(&[("李老师", "好的，今天就聊到这里，感谢大家收听！")]);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mock = Arc::new(
        MockLlmClient::new()
            .on(MARKER_OPENING, opening)
            .on_once(MARKER_CONTINUATION, duplicate)
            .on(MARKER_CONTINUATION, closing),
    );
    let engine = ScriptEngine::builder(mock.clone()).event_sink(tx).build();
    let script = engine
        .generate(&request("在线教育的未来", "5分钟", None))
        .await
        .unwrap();

    let d = &script.dialogues;
    assert_eq!(d.len(), 6);
    assert_eq!(d[3].character_name, "李老师");
    assert!(d[4].content.contains("感谢大家收听"));
    assert_eq!(d[5].content, DEFAULT_CLOSING_LINE);
    assert_eq!(mock.count_prompts(MARKER_ENDING), 0);
    assert_eq!(mock.count_prompts(MARKER_FAREWELL), 0);

    let meta = script.metadata.unwrap();
    assert_eq!(meta.stop_reason, StopReason::NaturalClose);
    assert_eq!(meta.iterations, 2);

    let mut dropped = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        if let ScriptEvent::TurnDropped { character_name, reason } = ev {
            dropped.push((character_name, reason));
        }
    }
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].0, "王同学");
    assert!(dropped[0].1.contains("duplicate"));
}

#[tokio::test]
async fn test_iteration_cap_and_default_closing() {
    let mock = Arc::new(
        MockLlmClient::new()
            .on(MARKER_OPENING, short_opening())
            .on(MARKER_CONTINUATION, dialogues_json(&[("王同学", "嗯，我同意。")]))
            .fail_on(MARKER_ENDING)
            .fail_on(MARKER_FAREWELL),
    );
    let engine = ScriptEngine::builder(mock.clone()).build();
    let script = engine
        .generate(&request("在线教育的未来", "3分钟", None))
        .await
        .unwrap();

    assert_eq!(mock.count_prompts(MARKER_CONTINUATION), 15);
    let meta = script.metadata.unwrap();
    assert_eq!(meta.stop_reason, StopReason::Exhausted);
    assert_eq!(meta.iterations, 15);

    let d = &script.dialogues;
    assert_eq!(d.len(), 4 + 15 + 1 + 2);
    let n = d.len();
    assert_eq!(d[n - 3].character_name, "李老师");
    assert_eq!(d[n - 3].content, DEFAULT_CLOSING_LINE);
    assert_eq!(d[n - 2].content, DEFAULT_FAREWELL_LINE);
    assert_eq!(d[n - 1].character_name, "王同学");
    assert_eq!(d[n - 1].content, DEFAULT_FAREWELL_LINE);
}

#[tokio::test]
async fn test_custom_iteration_cap() {
    let mock = Arc::new(
        MockLlmClient::new()
            .on(MARKER_OPENING, short_opening())
            .on(MARKER_CONTINUATION, dialogues_json(&[("李老师", "继续说。")]))
            .with_template_fallback(),
    );
    let settings = GenerationSettings {
        max_iterations: 3,
        ..GenerationSettings::default()
    };
    let engine = ScriptEngine::builder(mock.clone()).settings(settings).build();
    let script = engine
        .generate(&request("在线教育的未来", "10分钟", None))
        .await
        .unwrap();

    assert_eq!(mock.count_prompts(MARKER_CONTINUATION), 3);
    assert_eq!(script.metadata.unwrap().iterations, 3);
}

#[tokio::test]
async fn test_loop_failure_keeps_partial_script() {
    let mock = Arc::new(
        MockLlmClient::new()
            .on(MARKER_OPENING, short_opening())
            .on(MARKER_CONTINUATION, "对不起，我没法继续这段对话。")
            .with_template_fallback(),
    );
    let engine = ScriptEngine::builder(mock.clone()).build();
    let script = engine
        .generate(&request("在线教育的未来", "2分钟", None))
        .await
        .unwrap();

    assert_eq!(mock.count_prompts(MARKER_CONTINUATION), 1);
    let meta = script.metadata.unwrap();
    assert_eq!(meta.stop_reason, StopReason::Interrupted);
    assert_eq!(meta.iterations, 0);
    // 开场 4 条 + 结束语 2 条 + 道别 2 条
    assert_eq!(script.dialogues.len(), 8);
}

#[tokio::test]
async fn test_opening_failure_is_total_failure() {
    let mock = Arc::new(MockLlmClient::new().fail_on(MARKER_OPENING).with_template_fallback());
    let engine = ScriptEngine::builder(mock.clone()).build();
    let err = engine
        .generate(&request("在线教育的未来", "2分钟", None))
        .await
        .unwrap_err();
    assert!(matches!(err, ScriptError::TotalFailure(_)));
    assert_eq!(mock.count_prompts(MARKER_CONTINUATION), 0);
}

#[tokio::test]
async fn test_invalid_request_rejected_before_any_call() {
    let mut req = request("在线教育的未来", "2分钟", None);
    req.characters.truncate(1);
    let mock = Arc::new(MockLlmClient::new().with_template_fallback());
    let engine = ScriptEngine::builder(mock.clone()).build();

    let err = engine.generate(&req).await.unwrap_err();
    assert!(matches!(err, ScriptError::InvalidRequest(_)));
    assert!(mock.prompts().is_empty());
}

#[tokio::test]
async fn test_plan_cached_across_requests() {
    let mock = Arc::new(MockLlmClient::new().with_template_fallback());
    let engine = Arc::new(ScriptEngine::builder(mock.clone()).build());
    let req = request("在线教育的未来", "2分钟", None);

    let (a, b) = tokio::join!(engine.generate(&req), engine.generate(&req));
    assert!(a.is_ok() && b.is_ok());
    engine.generate(&req).await.unwrap();

    assert!(mock.count_prompts(MARKER_STRUCTURE) <= 2);
    let before = mock.count_prompts(MARKER_STRUCTURE);
    engine.generate(&req).await.unwrap();
    assert_eq!(mock.count_prompts(MARKER_STRUCTURE), before);
}
