//! 生成过程事件：阶段切换、规划与知识就绪、发言接收/丢弃、恢复动作与完成

use serde::Serialize;

use crate::core::GenerationPhase;
use crate::script::types::StopReason;

/// 可序列化为 JSON 推送给前端或日志
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScriptEvent {
    /// 状态机进入新阶段
    PhaseChanged { phase: GenerationPhase },
    /// 结构规划完成（阶段数）
    PlanReady { stages: usize },
    /// 知识上下文就绪（片段数与来源数）
    KnowledgeReady { snippets: usize, sources: usize },
    /// 素材分析完成；fallback 表示使用了模板分析
    AnalysisReady { fallback: bool },
    /// 发言通过校验并写入历史
    TurnAccepted {
        character_name: String,
        words: usize,
        total_words: usize,
    },
    /// 发言被丢弃（重复、不安全、事实冲突）
    TurnDropped { character_name: String, reason: String },
    /// 发言保留，但存在问题
    ValidationIssue { character_name: String, issues: Vec<String> },
    /// 错误恢复动作（Degrade / StopLoop / UseDefault）
    Recovery { action: String, detail: String },
    /// 生成循环结束
    LoopStopped { reason: StopReason, iterations: usize },
    /// 剧本完成
    Finished { dialogues: usize, words: usize },
}
