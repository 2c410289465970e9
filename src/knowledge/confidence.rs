//! 知识片段可信度评分
//!
//! 按来源类型给基础分，本地文件与内容长度再做微调；prompt 中只展示分级标记。

use serde::Serialize;

const ACADEMIC: [&str; 5] = [".pdf", "arxiv", "doi", "paper", "journal"];
const OFFICIAL: [&str; 4] = [".gov", ".edu", "official", "documentation"];
const ENCYCLOPEDIC: [&str; 2] = ["wikipedia", "wiki"];
const COMMUNITY: [&str; 4] = ["blog", "medium", "zhihu", "csdn"];
const SOCIAL: [&str; 4] = ["twitter", "weibo", "forum", "reddit"];

/// 可信度分级
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ConfidenceTier::High
        } else if score >= 0.6 {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }

    /// prompt 中的分级标记
    pub fn marker(&self) -> &'static str {
        match self {
            ConfidenceTier::High => "[高可信]",
            ConfidenceTier::Medium => "[中可信]",
            ConfidenceTier::Low => "[待核实]",
        }
    }
}

fn base_score(source: &str) -> f64 {
    let s = source.to_lowercase();
    let hit = |keys: &[&str]| keys.iter().any(|k| s.contains(k));
    if hit(&ACADEMIC) {
        0.95
    } else if hit(&OFFICIAL) {
        0.90
    } else if hit(&ENCYCLOPEDIC) {
        0.75
    } else if hit(&COMMUNITY) {
        0.65
    } else if hit(&SOCIAL) {
        0.45
    } else {
        0.6
    }
}

/// 计算 [0, 1] 区间、保留两位小数的可信度
pub fn score_confidence(source: &str, content: &str, is_local_file: bool) -> f64 {
    let mut score = base_score(source);
    if is_local_file {
        score = (score + 0.1).min(1.0);
    }
    let len = content.chars().count();
    if len < 50 {
        score *= 0.8;
    } else if len > 500 {
        score = (score + 0.05).min(1.0);
    }
    (score.clamp(0.0, 1.0) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(n: usize) -> String {
        "字".repeat(n)
    }

    #[test]
    fn test_source_types() {
        assert!(score_confidence("https://arxiv.org/abs/2301.0001", &body(100), false) >= 0.90);
        assert!(score_confidence("https://some-forum.net/t/1", &body(100), false) <= 0.45);
        assert_eq!(score_confidence("https://zh.wikipedia.org/x", &body(100), false), 0.75);
        assert_eq!(score_confidence("notes", &body(100), false), 0.6);
    }

    #[test]
    fn test_local_file_and_length_adjustments() {
        assert_eq!(score_confidence("notes.md", &body(100), true), 0.7);
        assert_eq!(score_confidence("notes", &body(10), false), 0.48);
        assert_eq!(score_confidence("notes", &body(600), false), 0.65);
        assert_eq!(score_confidence("paper.pdf", &body(600), true), 1.0);
    }

    #[test]
    fn test_tiers() {
        assert_eq!(ConfidenceTier::from_score(0.95), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_score(0.6), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_score(0.45), ConfidenceTier::Low);
        assert_eq!(ConfidenceTier::Low.marker(), "[待核实]");
    }
}
