//! 剧本生成状态机：INIT → OPENING → LOOPING → ENDING → FAREWELL → DONE
//!
//! 规划、知识检索与素材分析并发执行，各自独立降级；开场失败是唯一会返回给调用方的生成错误，
//! 循环中的失败只会让剧本变短。可选 event_tx：向前端推送阶段切换、发言接收/丢弃等事件。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join3;
use tokio::sync::mpsc::UnboundedSender;

use crate::analysis::{LlmMaterialAnalyzer, MaterialAnalysis, MaterialAnalyzer};
use crate::config::AppConfig;
use crate::core::{
    estimate_target_word_count, fingerprint, FingerprintCache, GenerationPhase, GenerationState,
    RecoveryEngine, ScriptError, DEFAULT_MAX_ITERATIONS, DEFAULT_WORDS_PER_MINUTE,
};
use crate::knowledge::{gather_context, KnowledgeContext, KnowledgeProvider, KnowledgeSnippet, NoopKnowledge};
use crate::llm::LlmClient;
use crate::script::events::ScriptEvent;
use crate::script::generator::{default_farewell, ContentGenerator, DEFAULT_CLOSING_LINE};
use crate::script::parser::ParseError;
use crate::script::planner::{current_stage, StructurePlanner};
use crate::script::prompts::ContinuationInput;
use crate::script::types::{
    estimate_duration_secs, PodcastRequest, PodcastScript, ScriptMetadata, StagePlan, StopReason, Turn,
};
use crate::script::validator::{TurnValidator, ValidationPolicy, Verdict};
use crate::text::{Sanitizer, StageDirectionSanitizer};

/// 知识上下文缓存容量
const KNOWLEDGE_CACHE_CAPACITY: usize = 50;

/// 生成参数（通常由 AppConfig 转换而来）
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub words_per_minute: usize,
    pub max_iterations: usize,
    /// 继续对话 prompt 携带的最近发言条数
    pub history_window: usize,
    /// 每个 prompt 最多引用的知识片段
    pub knowledge_in_prompt: usize,
    pub top_k: usize,
    pub max_snippets: usize,
    pub knowledge_cache: bool,
    pub plan_cache_capacity: usize,
    pub analysis_enabled: bool,
    pub analysis_attempts: usize,
    pub analysis_retry_delay: Duration,
    pub policy: ValidationPolicy,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            words_per_minute: DEFAULT_WORDS_PER_MINUTE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            history_window: 4,
            knowledge_in_prompt: 3,
            top_k: 3,
            max_snippets: 8,
            knowledge_cache: true,
            plan_cache_capacity: 50,
            analysis_enabled: true,
            analysis_attempts: 3,
            analysis_retry_delay: Duration::from_secs(1),
            policy: ValidationPolicy::default(),
        }
    }
}

impl GenerationSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            words_per_minute: cfg.generation.words_per_minute,
            max_iterations: cfg.generation.max_iterations,
            history_window: cfg.generation.history_window,
            knowledge_in_prompt: cfg.generation.knowledge_in_prompt,
            top_k: cfg.knowledge.top_k,
            max_snippets: cfg.knowledge.max_snippets,
            knowledge_cache: cfg.knowledge.cache_enabled,
            plan_cache_capacity: cfg.generation.plan_cache_capacity,
            analysis_enabled: cfg.analysis.enabled,
            analysis_attempts: cfg.analysis.max_retries,
            analysis_retry_delay: Duration::from_millis(cfg.analysis.retry_delay_ms),
            policy: ValidationPolicy {
                enforce_safety: cfg.generation.enforce_safety,
                enforce_fact_check: cfg.generation.enforce_fact_check,
            },
        }
    }
}

/// ScriptEngine 构建器：所有协作者通过构造注入
pub struct ScriptEngineBuilder {
    llm: Arc<dyn LlmClient>,
    knowledge: Option<Arc<dyn KnowledgeProvider>>,
    analyzer: Option<Arc<dyn MaterialAnalyzer>>,
    sanitizer: Option<Arc<dyn Sanitizer>>,
    plan_cache: Option<Arc<FingerprintCache<Vec<StagePlan>>>>,
    settings: GenerationSettings,
    event_tx: Option<UnboundedSender<ScriptEvent>>,
}

impl ScriptEngineBuilder {
    pub fn knowledge(mut self, provider: Arc<dyn KnowledgeProvider>) -> Self {
        self.knowledge = Some(provider);
        self
    }

    /// 替换默认的 LLM 素材分析器
    pub fn analyzer(mut self, analyzer: Arc<dyn MaterialAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn sanitizer(mut self, sanitizer: Arc<dyn Sanitizer>) -> Self {
        self.sanitizer = Some(sanitizer);
        self
    }

    /// 与其他引擎共享规划缓存
    pub fn plan_cache(mut self, cache: Arc<FingerprintCache<Vec<StagePlan>>>) -> Self {
        self.plan_cache = Some(cache);
        self
    }

    pub fn settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn event_sink(mut self, tx: UnboundedSender<ScriptEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn build(self) -> ScriptEngine {
        let settings = self.settings;
        let plan_cache = self
            .plan_cache
            .unwrap_or_else(|| Arc::new(FingerprintCache::new(settings.plan_cache_capacity)));
        let analyzer = if settings.analysis_enabled {
            Some(self.analyzer.unwrap_or_else(|| {
                Arc::new(
                    LlmMaterialAnalyzer::new(self.llm.clone())
                        .with_retries(settings.analysis_attempts, settings.analysis_retry_delay),
                )
            }))
        } else {
            None
        };
        let knowledge_cache = if settings.knowledge_cache {
            FingerprintCache::new(KNOWLEDGE_CACHE_CAPACITY)
        } else {
            FingerprintCache::disabled()
        };
        let sanitizer = self
            .sanitizer
            .unwrap_or_else(|| Arc::new(StageDirectionSanitizer::new()));

        ScriptEngine {
            planner: StructurePlanner::with_cache(self.llm.clone(), plan_cache),
            generator: ContentGenerator::new(self.llm, sanitizer),
            validator: TurnValidator::new(settings.policy),
            knowledge: self.knowledge.unwrap_or_else(|| Arc::new(NoopKnowledge)),
            analyzer,
            knowledge_cache,
            recovery: RecoveryEngine::new(),
            settings,
            event_tx: self.event_tx,
        }
    }
}

/// 剧本生成引擎；Send + Sync，可通过 Arc 在并发请求间共享
pub struct ScriptEngine {
    planner: StructurePlanner,
    generator: ContentGenerator,
    validator: TurnValidator,
    knowledge: Arc<dyn KnowledgeProvider>,
    analyzer: Option<Arc<dyn MaterialAnalyzer>>,
    knowledge_cache: FingerprintCache<KnowledgeContext>,
    recovery: RecoveryEngine,
    settings: GenerationSettings,
    event_tx: Option<UnboundedSender<ScriptEvent>>,
}

impl ScriptEngine {
    pub fn builder(llm: Arc<dyn LlmClient>) -> ScriptEngineBuilder {
        ScriptEngineBuilder {
            llm,
            knowledge: None,
            analyzer: None,
            sanitizer: None,
            plan_cache: None,
            settings: GenerationSettings::default(),
            event_tx: None,
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    fn emit(&self, ev: ScriptEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }

    fn enter(&self, state: &mut GenerationState, phase: GenerationPhase) {
        state.set_phase(phase);
        tracing::debug!(?phase, "Phase changed");
        self.emit(ScriptEvent::PhaseChanged { phase });
    }

    /// 记录恢复动作并推送事件
    fn recover(&self, err: &ScriptError, phase: GenerationPhase) {
        let action = self.recovery.handle(err, phase);
        tracing::warn!(?phase, ?action, error = %err, "Recovering from failure");
        self.emit(ScriptEvent::Recovery {
            action: format!("{:?}", action),
            detail: err.to_string(),
        });
    }

    fn append(&self, state: &mut GenerationState, turn: Turn) {
        let words = turn.word_count();
        let character_name = turn.character_name.clone();
        state.record_turn(turn);
        self.emit(ScriptEvent::TurnAccepted {
            character_name,
            words,
            total_words: state.current_word_count(),
        });
    }

    /// 逐条校验后写入历史，返回写入条数
    fn accept_turns(&self, state: &mut GenerationState, turns: Vec<Turn>, snippets: &[KnowledgeSnippet]) -> usize {
        let mut accepted = 0;
        for turn in turns {
            match self.validator.review(&turn, state.history(), snippets) {
                Verdict::Accepted => {}
                Verdict::Flagged(issues) => {
                    tracing::info!(speaker = %turn.character_name, ?issues, "Turn kept with validation issues");
                    self.emit(ScriptEvent::ValidationIssue {
                        character_name: turn.character_name.clone(),
                        issues,
                    });
                }
                Verdict::Rejected(reason) => {
                    tracing::info!(speaker = %turn.character_name, ?reason, "Turn dropped");
                    self.emit(ScriptEvent::TurnDropped {
                        character_name: turn.character_name,
                        reason: serde_json::to_string(&reason).unwrap_or_default(),
                    });
                    continue;
                }
            }
            self.append(state, turn);
            accepted += 1;
        }
        accepted
    }

    /// 知识上下文：按 (主题, 角色名) 缓存；失败时降级为空上下文
    async fn knowledge_context(&self, request: &PodcastRequest, cast: &[String]) -> KnowledgeContext {
        let joined = cast.join("、");
        let key = fingerprint("knowledge", &[request.topic.trim(), joined.as_str()]);
        if let Some(cached) = self.knowledge_cache.get(key) {
            tracing::debug!("Knowledge context cache hit");
            return cached;
        }
        match gather_context(
            self.knowledge.as_ref(),
            request.topic.trim(),
            cast,
            self.settings.top_k,
            self.settings.max_snippets,
        )
        .await
        {
            Ok(ctx) => {
                if !ctx.is_empty() {
                    self.knowledge_cache.insert(key, ctx.clone());
                }
                ctx
            }
            Err(e) => {
                self.recover(&e.into(), GenerationPhase::Init);
                KnowledgeContext::empty(&request.topic)
            }
        }
    }

    /// 有背景素材且启用分析器时才分析；失败时跳过
    async fn analyze_material(&self, request: &PodcastRequest) -> Option<MaterialAnalysis> {
        let analyzer = self.analyzer.as_ref()?;
        let material = request.material()?;
        match analyzer.analyze(material).await {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                self.recover(&e, GenerationPhase::Init);
                None
            }
        }
    }

    /// 生成完整剧本；只有请求非法或开场失败会返回错误
    #[tracing::instrument(name = "generate_script", skip_all, fields(request_id = %uuid::Uuid::new_v4(), topic = %request.topic))]
    pub async fn generate(&self, request: &PodcastRequest) -> Result<PodcastScript, ScriptError> {
        request.validate().map_err(ScriptError::InvalidRequest)?;

        let cast = request.cast_names();
        let host = cast.first().cloned().unwrap_or_default();
        let target = estimate_target_word_count(&request.target_duration, self.settings.words_per_minute);
        let mut state = GenerationState::with_target_words(cast.clone(), target)
            .with_max_iterations(self.settings.max_iterations);
        tracing::info!(target_words = target, cast = cast.len(), "Script generation started");

        let (plan, knowledge, analysis) = join3(
            self.planner.plan(request, target),
            self.knowledge_context(request, &cast),
            self.analyze_material(request),
        )
        .await;
        self.emit(ScriptEvent::PlanReady { stages: plan.len() });
        self.emit(ScriptEvent::KnowledgeReady {
            snippets: knowledge.snippets.len(),
            sources: knowledge.sources_count(),
        });
        if let Some(a) = &analysis {
            self.emit(ScriptEvent::AnalysisReady { fallback: a.fallback });
        }
        let prompt_knowledge = knowledge.top(self.settings.knowledge_in_prompt);

        // 开场
        self.enter(&mut state, GenerationPhase::Opening);
        let opening = match self
            .generator
            .generate_opening(request, prompt_knowledge, analysis.as_ref())
            .await
        {
            Ok(turns) => turns,
            Err(e) => {
                self.recover(&e, GenerationPhase::Opening);
                return Err(ScriptError::TotalFailure(Box::new(e)));
            }
        };
        if self.accept_turns(&mut state, opening, &knowledge.snippets) == 0 {
            return Err(ScriptError::TotalFailure(Box::new(ParseError::NoDialogues.into())));
        }

        // 对话循环
        self.enter(&mut state, GenerationPhase::Looping);
        let stop_reason = loop {
            if state.ended_naturally() {
                break StopReason::NaturalClose;
            }
            if state.target_reached() {
                break StopReason::TargetReached;
            }
            if state.iterations_exhausted() {
                break StopReason::Exhausted;
            }
            let Some(speaker) = state.next_speaker() else {
                break StopReason::Interrupted;
            };
            let input = ContinuationInput {
                request,
                next_speaker: &speaker,
                history: state.recent(self.settings.history_window),
                knowledge: prompt_knowledge,
                stage: current_stage(&plan, state.current_word_count()),
                current_words: state.current_word_count(),
                target_words: state.target_word_count(),
            };
            let result = self.generator.generate_continuation(&input).await;
            match result {
                Ok(turns) => {
                    let accepted = self.accept_turns(&mut state, turns, &knowledge.snippets);
                    tracing::debug!(
                        iteration = state.iteration_count() + 1,
                        speaker = %speaker,
                        accepted,
                        words = state.current_word_count(),
                        "Loop iteration finished"
                    );
                }
                Err(e) => {
                    self.recover(&e, GenerationPhase::Looping);
                    break StopReason::Interrupted;
                }
            }
            state.complete_iteration();
        };
        tracing::info!(
            ?stop_reason,
            iterations = state.iteration_count(),
            words = state.current_word_count(),
            target = state.target_word_count(),
            "Generation loop stopped"
        );
        self.emit(ScriptEvent::LoopStopped {
            reason: stop_reason,
            iterations: state.iteration_count(),
        });

        // 收尾
        if state.ended_naturally() {
            self.append(&mut state, Turn::new(host.as_str(), DEFAULT_CLOSING_LINE));
        } else {
            self.enter(&mut state, GenerationPhase::Ending);
            let recent = state.recent(self.settings.history_window).to_vec();
            let ending = match self.generator.generate_ending(request, &recent).await {
                Ok(turns) => turns,
                Err(e) => {
                    self.recover(&e, GenerationPhase::Ending);
                    vec![Turn::new(host.as_str(), DEFAULT_CLOSING_LINE)]
                }
            };
            ending.into_iter().for_each(|t| self.append(&mut state, t));

            self.enter(&mut state, GenerationPhase::Farewell);
            let farewell = match self.generator.generate_farewell(request).await {
                Ok(turns) => turns,
                Err(e) => {
                    self.recover(&e, GenerationPhase::Farewell);
                    default_farewell(&cast)
                }
            };
            farewell.into_iter().for_each(|t| self.append(&mut state, t));
        }
        self.enter(&mut state, GenerationPhase::Done);

        let metadata = ScriptMetadata {
            rag_enabled: !knowledge.is_empty(),
            knowledge_sources_count: knowledge.sources_count(),
            knowledge_points_used: prompt_knowledge.len(),
            source_summary: knowledge.source_summary.clone(),
            analysis_used: analysis.is_some(),
            plan_stages: plan.len(),
            iterations: state.iteration_count(),
            stop_reason,
            generated_at: Utc::now(),
        };
        let words = state.current_word_count();
        let dialogues = state.into_history();
        self.emit(ScriptEvent::Finished {
            dialogues: dialogues.len(),
            words,
        });
        tracing::info!(dialogues = dialogues.len(), words, "Script generation finished");

        Ok(PodcastScript {
            title: request.display_title(),
            topic: request.topic.clone(),
            estimated_duration: Some(estimate_duration_secs(&dialogues, self.settings.words_per_minute)),
            dialogues,
            metadata: Some(metadata),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let mut cfg = AppConfig::default();
        cfg.generation.max_iterations = 6;
        cfg.generation.enforce_safety = true;
        cfg.analysis.retry_delay_ms = 10;
        let settings = GenerationSettings::from_config(&cfg);
        assert_eq!(settings.max_iterations, 6);
        assert!(settings.policy.enforce_safety);
        assert!(!settings.policy.enforce_fact_check);
        assert_eq!(settings.analysis_retry_delay, Duration::from_millis(10));
        assert_eq!(settings.words_per_minute, 175);
    }

    #[test]
    fn test_engine_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ScriptEngine>();
    }
}
