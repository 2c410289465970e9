//! 生成状态：对话历史、字数统计、轮流发言与终止判断
//!
//! 每个请求创建一个 GenerationState，贯穿开场、循环、结束语与道别，完成后丢弃。

use serde::Serialize;

use crate::script::types::Turn;

/// 播客语速：每分钟约 175 字（一个汉字计一个「字」）
pub const DEFAULT_WORDS_PER_MINUTE: usize = 175;
/// 时长字符串中解析不到数字时的默认目标字数
pub const DEFAULT_TARGET_WORDS: usize = 800;
/// 循环轮数硬上限
pub const DEFAULT_MAX_ITERATIONS: usize = 15;
/// 出现在最后一条发言中即视为自然收尾
pub const TERMINATION_PHRASES: [&str; 4] = ["感谢大家收听", "今天的播客", "我们下期再见", "谢谢收听"];

/// 生成阶段（状态机）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPhase {
    Init,
    Opening,
    Looping,
    Ending,
    Farewell,
    Done,
}

/// 根据时长字符串估算目标字数：取第一个整数作为分钟数（带「小时」/hour 时乘 60）
pub fn estimate_target_word_count(duration: &str, words_per_minute: usize) -> usize {
    let digits: String = duration
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let Ok(amount) = digits.parse::<usize>() else {
        return DEFAULT_TARGET_WORDS;
    };
    let lower = duration.to_lowercase();
    let minutes = if lower.contains("小时") || lower.contains("hour") {
        amount.checked_mul(60)
    } else {
        Some(amount)
    };
    match minutes.and_then(|m| m.checked_mul(words_per_minute)) {
        Some(words) => words,
        None => {
            tracing::warn!(duration, "Target duration out of range, using default word count");
            DEFAULT_TARGET_WORDS
        }
    }
}

/// 文本中是否含有收尾短语
pub fn contains_termination_phrase(text: &str) -> bool {
    TERMINATION_PHRASES.iter().any(|p| text.contains(p))
}

/// 单次请求的可变生成记录
#[derive(Clone, Debug)]
pub struct GenerationState {
    history: Vec<Turn>,
    participants: Vec<String>,
    rotation_index: usize,
    target_word_count: usize,
    current_word_count: usize,
    iteration_count: usize,
    max_iterations: usize,
    phase: GenerationPhase,
}

impl GenerationState {
    pub fn initialize(participants: Vec<String>, target_duration: &str) -> Self {
        let target = estimate_target_word_count(target_duration, DEFAULT_WORDS_PER_MINUTE);
        Self::with_target_words(participants, target)
    }

    pub fn with_target_words(participants: Vec<String>, target_word_count: usize) -> Self {
        Self {
            history: Vec::new(),
            participants,
            rotation_index: 0,
            target_word_count,
            current_word_count: 0,
            iteration_count: 0,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            phase: GenerationPhase::Init,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// 轮流选出下一位发言者；参与者为空时返回 None
    pub fn next_speaker(&mut self) -> Option<String> {
        if self.participants.is_empty() {
            return None;
        }
        let speaker = self.participants[self.rotation_index].clone();
        self.rotation_index = (self.rotation_index + 1) % self.participants.len();
        Some(speaker)
    }

    /// 追加一条已通过校验的发言
    pub fn record_turn(&mut self, turn: Turn) {
        self.current_word_count += turn.word_count();
        self.history.push(turn);
    }

    pub fn complete_iteration(&mut self) {
        self.iteration_count += 1;
    }

    pub fn target_reached(&self) -> bool {
        self.current_word_count >= self.target_word_count
    }

    /// 最后一条发言是否已经包含收尾短语
    pub fn ended_naturally(&self) -> bool {
        self.history
            .last()
            .map(|t| contains_termination_phrase(&t.content))
            .unwrap_or(false)
    }

    pub fn iterations_exhausted(&self) -> bool {
        self.iteration_count >= self.max_iterations
    }

    pub fn should_terminate(&self) -> bool {
        self.target_reached() || self.ended_naturally() || self.iterations_exhausted()
    }

    pub fn set_phase(&mut self, phase: GenerationPhase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "phase transition");
        self.phase = phase;
    }

    pub fn phase(&self) -> GenerationPhase {
        self.phase
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// 最近 n 条发言（不足 n 条时返回全部）
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    pub fn participants(&self) -> &[String] {
        &self.participants
    }

    pub fn target_word_count(&self) -> usize {
        self.target_word_count
    }

    pub fn current_word_count(&self) -> usize {
        self.current_word_count
    }

    pub fn iteration_count(&self) -> usize {
        self.iteration_count
    }

    pub fn into_history(self) -> Vec<Turn> {
        self.history
    }
}
