//! 结构规划：把目标字数分配到 5 到 7 个阶段
//!
//! 一次 LLM 调用（温度 0.5）；输出不可用或阶段数不在 5 到 7 之间时使用六阶段模板。
//! 结果按 (主题, 时长, 角色数, 氛围) 指纹缓存，模板结果同样缓存。

use std::sync::Arc;

use serde::Deserialize;

use crate::core::{fingerprint, FingerprintCache};
use crate::llm::LlmClient;
use crate::script::parser::strip_code_fences;
use crate::script::prompts;
use crate::script::types::{PodcastRequest, StagePlan};

const PLANNER_TEMPERATURE: f32 = 0.5;
const MIN_STAGES: usize = 5;
const MAX_STAGES: usize = 7;
/// 阶段字数之和允许偏离目标的比例
const BUDGET_TOLERANCE: f64 = 0.1;

#[derive(Deserialize)]
#[serde(untagged)]
enum PlanEnvelope {
    Wrapped { stages: Vec<StagePlan> },
    Bare(Vec<StagePlan>),
}

/// 模板阶段：(名称, 占比%, 仅主持人, 目标, 互动方式)
const TEMPLATE_STAGES: [(&str, usize, bool, &str, &str); 6] = [
    ("开场引入", 15, true, "介绍主题与嘉宾，抛出核心问题", "主持人引导"),
    ("话题展开", 20, false, "各位嘉宾阐述基本立场", "轮流发言"),
    ("深入探讨", 30, false, "结合案例与数据深入分析", "追问与补充"),
    ("观点交锋", 20, false, "围绕分歧点展开讨论", "正面交锋"),
    ("总结升华", 10, true, "梳理关键观点，提炼启发", "主持人总结"),
    ("致谢告别", 5, false, "感谢嘉宾与听众", "集体告别"),
];

/// 六阶段模板：开场 15%、展开 20%、深入 30%、交锋 20%、总结 10%、告别 5%
pub fn fallback_plan(target_words: usize, cast: &[String]) -> Vec<StagePlan> {
    let host = cast.first().cloned().into_iter().collect::<Vec<_>>();
    let mut plan: Vec<StagePlan> = TEMPLATE_STAGES
        .iter()
        .enumerate()
        .map(|(i, (name, share, host_only, objective, style))| StagePlan {
            stage_number: i as u32 + 1,
            name: name.to_string(),
            target_words: (target_words as u128 * *share as u128 / 100) as usize,
            objectives: vec![objective.to_string()],
            discussion_points: Vec::new(),
            participants: if *host_only { host.clone() } else { cast.to_vec() },
            interaction_style: style.to_string(),
        })
        .collect();
    settle_remainder(&mut plan, target_words);
    plan
}

/// 阶段字数之和（饱和相加）
fn budget_sum(plan: &[StagePlan]) -> usize {
    plan.iter().fold(0usize, |acc, s| acc.saturating_add(s.target_words))
}

/// 取整误差计入最后一个阶段，使总和等于目标
fn settle_remainder(plan: &mut [StagePlan], target_words: usize) {
    let sum = budget_sum(plan);
    if let Some(last) = plan.last_mut() {
        if sum <= target_words {
            last.target_words += target_words - sum;
        } else {
            last.target_words = last.target_words.saturating_sub(sum - target_words);
        }
    }
}

/// 阶段字数之和偏离目标超过 10% 时按比例缩放
fn rescale(plan: &mut [StagePlan], target_words: usize) {
    let sum = budget_sum(plan);
    let tolerance = target_words as f64 * BUDGET_TOLERANCE;
    if (sum as f64 - target_words as f64).abs() <= tolerance {
        return;
    }
    tracing::debug!(sum, target_words, "Rescaling stage budgets");
    if sum == 0 {
        let each = target_words / plan.len().max(1);
        plan.iter_mut().for_each(|s| s.target_words = each);
    } else {
        for stage in plan.iter_mut() {
            stage.target_words =
                (stage.target_words as f64 * target_words as f64 / sum as f64).round() as usize;
        }
    }
    settle_remainder(plan, target_words);
}

/// 阶段参与者只保留角色列表中的名字，为空时使用全部角色
fn normalize_participants(plan: &mut [StagePlan], cast: &[String]) {
    for stage in plan.iter_mut() {
        stage.participants.retain(|p| cast.contains(p));
        if stage.participants.is_empty() {
            stage.participants = cast.to_vec();
        }
    }
}

/// 按已生成字数找到当前所处阶段
pub fn current_stage(plan: &[StagePlan], words_so_far: usize) -> Option<&StagePlan> {
    let mut cumulative: usize = 0;
    for stage in plan {
        cumulative = cumulative.saturating_add(stage.target_words);
        if words_so_far < cumulative {
            return Some(stage);
        }
    }
    plan.last()
}

/// 结构规划器
pub struct StructurePlanner {
    llm: Arc<dyn LlmClient>,
    cache: Arc<FingerprintCache<Vec<StagePlan>>>,
}

impl StructurePlanner {
    pub fn new(llm: Arc<dyn LlmClient>, cache_capacity: usize) -> Self {
        Self::with_cache(llm, Arc::new(FingerprintCache::new(cache_capacity)))
    }

    pub fn with_cache(llm: Arc<dyn LlmClient>, cache: Arc<FingerprintCache<Vec<StagePlan>>>) -> Self {
        Self { llm, cache }
    }

    fn cache_key(request: &PodcastRequest) -> u64 {
        let cast_size = request.characters.len().to_string();
        fingerprint(
            "structure",
            &[
                request.topic.trim(),
                request.target_duration.trim(),
                cast_size.as_str(),
                request.atmosphere.as_str(),
            ],
        )
    }

    /// 解析模型给出的规划；阶段数不合法时返回 None
    fn parse_plan(raw: &str, target_words: usize, cast: &[String]) -> Option<Vec<StagePlan>> {
        let envelope: PlanEnvelope = match serde_json::from_str(&strip_code_fences(raw)) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "Structure plan is not valid JSON");
                return None;
            }
        };
        let mut plan = match envelope {
            PlanEnvelope::Wrapped { stages } => stages,
            PlanEnvelope::Bare(stages) => stages,
        };
        if !(MIN_STAGES..=MAX_STAGES).contains(&plan.len()) {
            tracing::warn!(stages = plan.len(), "Structure plan has wrong stage count");
            return None;
        }
        // 单个阶段超过总目标的规划视为无效
        if plan.iter().any(|s| s.target_words > target_words) {
            tracing::warn!(target_words, "Structure plan has an implausible stage budget");
            return None;
        }
        for (i, stage) in plan.iter_mut().enumerate() {
            stage.stage_number = i as u32 + 1;
        }
        rescale(&mut plan, target_words);
        normalize_participants(&mut plan, cast);
        Some(plan)
    }

    /// 生成阶段规划；失败时退回模板，从不报错
    pub async fn plan(&self, request: &PodcastRequest, target_words: usize) -> Vec<StagePlan> {
        let cast = request.cast_names();
        let key = Self::cache_key(request);
        if let Some(mut cached) = self.cache.get(key) {
            tracing::debug!("Structure plan cache hit");
            normalize_participants(&mut cached, &cast);
            return cached;
        }

        let prompt = prompts::structure_prompt(request, target_words);
        let plan = match self.llm.complete(&prompt, PLANNER_TEMPERATURE).await {
            Ok(raw) => Self::parse_plan(&raw, target_words, &cast),
            Err(e) => {
                tracing::warn!(error = %e, "Structure planning call failed");
                None
            }
        }
        .unwrap_or_else(|| {
            tracing::info!(target_words, "Using template structure plan");
            fallback_plan(target_words, &cast)
        });

        self.cache.insert(key, plan.clone());
        plan
    }
}
