//! 错误恢复引擎
//!
//! 根据 ScriptError 与出错时所处的阶段返回 RecoveryAction，供生成循环决定是终止、停止循环、使用默认内容还是降级。

use crate::core::{GenerationPhase, RecoveryAction, ScriptError};

/// 除开场与请求校验外，所有失败都只缩短剧本，不向调用方抛出
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &ScriptError, phase: GenerationPhase) -> RecoveryAction {
        match (err, phase) {
            (ScriptError::InvalidRequest(_), _) | (ScriptError::Config(_), _) => RecoveryAction::Abort,
            (ScriptError::TotalFailure(_), _) => RecoveryAction::Abort,
            (ScriptError::KnowledgeUnavailable(_), _) | (ScriptError::AnalysisFailure(_), _) => {
                RecoveryAction::Degrade
            }
            (_, GenerationPhase::Init) => RecoveryAction::UseDefault,
            (_, GenerationPhase::Opening) => RecoveryAction::Abort,
            (_, GenerationPhase::Looping) => RecoveryAction::StopLoop,
            (_, GenerationPhase::Ending) | (_, GenerationPhase::Farewell) => RecoveryAction::UseDefault,
            (_, GenerationPhase::Done) => RecoveryAction::UseDefault,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::script::parser::ParseError;

    #[test]
    fn test_opening_failure_aborts() {
        let engine = RecoveryEngine::new();
        let err = ScriptError::Llm(LlmError::Timeout(60));
        assert_eq!(engine.handle(&err, GenerationPhase::Opening), RecoveryAction::Abort);
    }

    #[test]
    fn test_loop_parse_failure_stops_loop() {
        let engine = RecoveryEngine::new();
        let err = ScriptError::PromptFormat(ParseError::NoDialogues);
        assert_eq!(engine.handle(&err, GenerationPhase::Looping), RecoveryAction::StopLoop);
    }

    #[test]
    fn test_closing_failure_uses_default() {
        let engine = RecoveryEngine::new();
        let err = ScriptError::Llm(LlmError::EmptyResponse);
        assert_eq!(engine.handle(&err, GenerationPhase::Ending), RecoveryAction::UseDefault);
        assert_eq!(engine.handle(&err, GenerationPhase::Farewell), RecoveryAction::UseDefault);
    }

    #[test]
    fn test_planning_failure_uses_template() {
        let engine = RecoveryEngine::new();
        let err = ScriptError::PromptFormat(ParseError::NoDialogues);
        assert_eq!(engine.handle(&err, GenerationPhase::Init), RecoveryAction::UseDefault);
    }

    #[test]
    fn test_side_inputs_degrade() {
        let engine = RecoveryEngine::new();
        let err = ScriptError::KnowledgeUnavailable("vector store down".to_string());
        assert_eq!(engine.handle(&err, GenerationPhase::Init), RecoveryAction::Degrade);
        let err = ScriptError::AnalysisFailure("quota".to_string());
        assert_eq!(engine.handle(&err, GenerationPhase::Init), RecoveryAction::Degrade);
    }

    #[test]
    fn test_invalid_request_aborts() {
        let engine = RecoveryEngine::new();
        let err = ScriptError::InvalidRequest("1 character".to_string());
        assert_eq!(engine.handle(&err, GenerationPhase::Init), RecoveryAction::Abort);
    }
}
