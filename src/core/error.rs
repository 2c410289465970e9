//! 剧本生成错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 ScriptError 与所处阶段决定 Abort / StopLoop / UseDefault / Degrade。

use thiserror::Error;

use crate::knowledge::KnowledgeError;
use crate::llm::LlmError;
use crate::script::parser::ParseError;

/// 剧本生成过程中可能出现的错误（请求校验、LLM、解析、知识检索、素材分析）
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// 模型输出经过全部修复步骤后仍不是合法的对话 JSON
    #[error("Prompt format error: {0}")]
    PromptFormat(#[from] ParseError),

    #[error("Knowledge unavailable: {0}")]
    KnowledgeUnavailable(String),

    #[error("Material analysis failed: {0}")]
    AnalysisFailure(String),

    /// 开场生成失败：没有开场就没有剧本，直接向调用方返回
    #[error("Opening generation failed: {0}")]
    TotalFailure(#[source] Box<ScriptError>),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<KnowledgeError> for ScriptError {
    fn from(err: KnowledgeError) -> Self {
        ScriptError::KnowledgeUnavailable(err.to_string())
    }
}

impl From<config::ConfigError> for ScriptError {
    fn from(err: config::ConfigError) -> Self {
        ScriptError::Config(err.to_string())
    }
}

/// 恢复引擎根据错误与阶段给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 终止整个请求（开场失败、请求非法）
    Abort,
    /// 结束生成循环，保留已累积的对话
    StopLoop,
    /// 用默认内容替代（规划模板、默认结束语、默认道别）
    UseDefault,
    /// 降级继续：空知识上下文 / 跳过素材分析
    Degrade,
}
