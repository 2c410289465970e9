//! 素材分析：把背景资料提炼为可供对话引用的结构化要点
//!
//! LLM 实现温度 0.4，最多尝试 3 次（间隔 1 秒）；全部失败时返回基于素材前 100 词的模板分析，
//! 并标记 fallback = true。分析失败从不中断剧本生成。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::ScriptError;
use crate::llm::LlmClient;
use crate::script::parser::strip_code_fences;
use crate::script::prompts;

const ANALYSIS_TEMPERATURE: f32 = 0.4;

/// 结构化素材分析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialAnalysis {
    pub main_thesis: String,
    pub key_arguments: Vec<String>,
    #[serde(alias = "supporting_data_or_examples")]
    pub supporting_data: Vec<String>,
    #[serde(alias = "potential_counterarguments")]
    pub counterarguments: Vec<String>,
    pub discussion_questions: Vec<String>,
    #[serde(default)]
    pub podcast_hooks: Vec<String>,
    /// 模板生成而非模型分析
    #[serde(default)]
    pub fallback: bool,
}

impl MaterialAnalysis {
    /// 核心主张非空，必填列表至少一项
    pub fn is_complete(&self) -> bool {
        !self.main_thesis.trim().is_empty()
            && !self.key_arguments.is_empty()
            && !self.supporting_data.is_empty()
            && !self.counterarguments.is_empty()
            && !self.discussion_questions.is_empty()
    }
}

/// 素材分析 trait
#[async_trait]
pub trait MaterialAnalyzer: Send + Sync {
    async fn analyze(&self, material: &str) -> Result<MaterialAnalysis, ScriptError>;
}

/// 模板分析：取素材前 100 个词，预览不超过 200 字符
pub fn fallback_analysis(material: &str) -> MaterialAnalysis {
    let words: Vec<&str> = material.split_whitespace().take(100).collect();
    let preview: String = words.join(" ").chars().take(200).collect();
    MaterialAnalysis {
        main_thesis: "基于提供的素材内容进行深入讨论".to_string(),
        key_arguments: vec![
            "素材中提到的核心观点和论据".to_string(),
            "相关领域的专业见解".to_string(),
            "实践案例和数据支撑".to_string(),
        ],
        supporting_data: vec![format!("素材摘要：{}...", preview), "相关背景信息和上下文".to_string()],
        counterarguments: vec!["不同视角的观点和质疑".to_string(), "需要进一步验证的假设".to_string()],
        discussion_questions: vec![
            "这个观点的核心价值是什么？".to_string(),
            "在实际应用中会遇到哪些挑战？".to_string(),
            "如何评估这个观点的长期影响？".to_string(),
        ],
        podcast_hooks: vec!["引发思考的核心议题".to_string(), "与听众相关的实际场景".to_string()],
        fallback: true,
    }
}

/// 基于 LLM 的素材分析器
pub struct LlmMaterialAnalyzer {
    llm: Arc<dyn LlmClient>,
    max_attempts: usize,
    retry_delay: Duration,
}

impl LlmMaterialAnalyzer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            max_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    pub fn with_retries(mut self, max_attempts: usize, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    async fn attempt(&self, prompt: &str) -> Result<MaterialAnalysis, String> {
        let raw = self
            .llm
            .complete(prompt, ANALYSIS_TEMPERATURE)
            .await
            .map_err(|e| e.to_string())?;
        let analysis: MaterialAnalysis =
            serde_json::from_str(&strip_code_fences(&raw)).map_err(|e| e.to_string())?;
        if !analysis.is_complete() {
            return Err("analysis is missing required fields".to_string());
        }
        Ok(analysis)
    }
}

#[async_trait]
impl MaterialAnalyzer for LlmMaterialAnalyzer {
    async fn analyze(&self, material: &str) -> Result<MaterialAnalysis, ScriptError> {
        let prompt = prompts::analysis_prompt(material);
        for attempt in 1..=self.max_attempts {
            match self.attempt(&prompt).await {
                Ok(analysis) => {
                    tracing::info!(
                        attempt,
                        key_arguments = analysis.key_arguments.len(),
                        questions = analysis.discussion_questions.len(),
                        "Material analysis completed"
                    );
                    return Ok(analysis);
                }
                Err(e) => {
                    tracing::warn!(attempt, max = self.max_attempts, error = %e, "Material analysis attempt failed");
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        tracing::warn!("All material analysis attempts failed, using template analysis");
        Ok(fallback_analysis(material))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::script::prompts::MARKER_ANALYSIS;

    const GOOD: &str = r#"```json
{"main_thesis":"混合式学习会成为主流","key_arguments":["成本更低"],
 "supporting_data_or_examples":["某校试点数据"],"potential_counterarguments":["自律要求高"],
 "discussion_questions":["老师的角色会怎么变？"]}
```"#;

    #[tokio::test]
    async fn test_parses_fenced_analysis_with_long_field_names() {
        let mock = Arc::new(MockLlmClient::new().on(MARKER_ANALYSIS, GOOD));
        let analyzer = LlmMaterialAnalyzer::new(mock.clone());
        let analysis = analyzer.analyze("一些素材").await.unwrap();
        assert_eq!(analysis.main_thesis, "混合式学习会成为主流");
        assert_eq!(analysis.supporting_data, vec!["某校试点数据"]);
        assert!(!analysis.fallback);
        assert_eq!(mock.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_retries_then_falls_back() {
        let mock = Arc::new(MockLlmClient::new().on(MARKER_ANALYSIS, "not json"));
        let analyzer = LlmMaterialAnalyzer::new(mock.clone()).with_retries(3, Duration::from_millis(1));
        let analysis = analyzer.analyze("第一句 第二句").await.unwrap();
        assert!(analysis.fallback);
        assert!(analysis.supporting_data[0].contains("第一句 第二句"));
        assert_eq!(mock.prompts().len(), 3);
    }

    #[tokio::test]
    async fn test_incomplete_analysis_is_retried() {
        let incomplete = r#"{"main_thesis":"x","key_arguments":[],"supporting_data":["a"],"counterarguments":["b"],"discussion_questions":["c"]}"#;
        let mock = Arc::new(
            MockLlmClient::new()
                .on_once(MARKER_ANALYSIS, incomplete)
                .on(MARKER_ANALYSIS, GOOD),
        );
        let analyzer = LlmMaterialAnalyzer::new(mock.clone()).with_retries(3, Duration::from_millis(1));
        let analysis = analyzer.analyze("素材").await.unwrap();
        assert!(!analysis.fallback);
        assert_eq!(mock.prompts().len(), 2);
    }

    #[test]
    fn test_fallback_preview_is_bounded() {
        let material = "词 ".repeat(500);
        let analysis = fallback_analysis(&material);
        assert!(analysis.supporting_data[0].chars().count() <= "素材摘要：".chars().count() + 200 + 3);
    }
}
