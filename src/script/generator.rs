//! 内容生成：开场、继续对话、结束语与集体道别
//!
//! 每次调用：构造 prompt → LLM 补全 → parse_model_json 修复解析 → 舞台指示清理 →
//! 丢弃空内容与角色列表之外的发言。失败时返回 ScriptError，由生成循环决定如何恢复。

use std::sync::Arc;

use crate::analysis::MaterialAnalysis;
use crate::core::ScriptError;
use crate::knowledge::KnowledgeSnippet;
use crate::llm::LlmClient;
use crate::script::parser::{parse_model_json, ParseError};
use crate::script::prompts::{self, ContinuationInput};
use crate::script::types::{PodcastRequest, Turn};
use crate::text::Sanitizer;

const OPENING_TEMPERATURE: f32 = 0.7;
const CONTINUATION_TEMPERATURE: f32 = 0.7;
const ENDING_TEMPERATURE: f32 = 0.6;
const FAREWELL_TEMPERATURE: f32 = 0.6;

/// 结束语只剩一段或生成失败时使用的主持人收尾
pub const DEFAULT_CLOSING_LINE: &str = "感谢大家收听今天的播客，我们下期再见！";
/// 道别缺失时的默认台词
pub const DEFAULT_FAREWELL_LINE: &str = "再见！";
/// 结束语固定为主持人的两段发言
const ENDING_TURNS: usize = 2;

/// 每位角色一句默认道别
pub fn default_farewell(cast: &[String]) -> Vec<Turn> {
    cast.iter()
        .map(|name| Turn::new(name.as_str(), DEFAULT_FAREWELL_LINE))
        .collect()
}

pub struct ContentGenerator {
    llm: Arc<dyn LlmClient>,
    sanitizer: Arc<dyn Sanitizer>,
}

impl ContentGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, sanitizer: Arc<dyn Sanitizer>) -> Self {
        Self { llm, sanitizer }
    }

    /// 清理内容并过滤：空内容或说话人不在角色列表中的发言被丢弃
    fn post_process(&self, turns: Vec<Turn>, cast: &[String]) -> Vec<Turn> {
        turns
            .into_iter()
            .filter_map(|turn| {
                if !cast.contains(&turn.character_name) {
                    tracing::debug!(speaker = %turn.character_name, "Dropping turn from unknown speaker");
                    return None;
                }
                let content = self
                    .sanitizer
                    .strip_stage_directions(&turn.content, turn.emotion.as_deref());
                if content.trim().is_empty() {
                    return None;
                }
                Some(Turn { content, ..turn })
            })
            .collect()
    }

    async fn run(&self, prompt: &str, temperature: f32, cast: &[String]) -> Result<Vec<Turn>, ScriptError> {
        let raw = self.llm.complete(prompt, temperature).await?;
        let parsed = parse_model_json(&raw)?;
        let turns = self.post_process(parsed, cast);
        if turns.is_empty() {
            return Err(ParseError::NoDialogues.into());
        }
        Ok(turns)
    }

    /// 开场：主持人自我介绍、介绍嘉宾、第一轮问答
    pub async fn generate_opening(
        &self,
        request: &PodcastRequest,
        knowledge: &[KnowledgeSnippet],
        analysis: Option<&MaterialAnalysis>,
    ) -> Result<Vec<Turn>, ScriptError> {
        let prompt = prompts::opening_prompt(request, knowledge, analysis);
        let turns = self
            .run(&prompt, OPENING_TEMPERATURE, &request.cast_names())
            .await?;
        tracing::debug!(turns = turns.len(), "Opening generated");
        Ok(turns)
    }

    /// 继续对话：1 到 3 条发言
    pub async fn generate_continuation(&self, input: &ContinuationInput<'_>) -> Result<Vec<Turn>, ScriptError> {
        let prompt = prompts::continuation_prompt(input);
        self.run(&prompt, CONTINUATION_TEMPERATURE, &input.request.cast_names())
            .await
    }

    /// 结束语：恰好两段主持人发言（总结、致谢）；只有一段时补默认收尾
    pub async fn generate_ending(&self, request: &PodcastRequest, recent: &[Turn]) -> Result<Vec<Turn>, ScriptError> {
        let cast = request.cast_names();
        let host = cast.first().cloned().unwrap_or_default();
        let prompt = prompts::ending_prompt(request, recent);
        let mut turns: Vec<Turn> = self
            .run(&prompt, ENDING_TEMPERATURE, &cast)
            .await?
            .into_iter()
            .filter(|t| t.character_name == host)
            .take(ENDING_TURNS)
            .collect();
        match turns.len() {
            0 => return Err(ParseError::NoDialogues.into()),
            1 => turns.push(Turn::new(host.as_str(), DEFAULT_CLOSING_LINE)),
            _ => {}
        }
        Ok(turns)
    }

    /// 集体道别：按角色顺序每人一句；缺失的补「再见！」，多余的丢弃
    pub async fn generate_farewell(&self, request: &PodcastRequest) -> Result<Vec<Turn>, ScriptError> {
        let cast = request.cast_names();
        let prompt = prompts::farewell_prompt(request);
        let mut produced = self.run(&prompt, FAREWELL_TEMPERATURE, &cast).await?;
        let farewell = cast
            .iter()
            .map(|name| {
                match produced.iter().position(|t| &t.character_name == name) {
                    Some(i) => produced.remove(i),
                    None => Turn::new(name.as_str(), DEFAULT_FAREWELL_LINE),
                }
            })
            .collect();
        Ok(farewell)
    }
}
