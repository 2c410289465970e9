//! 发言校验：重复检测、内容安全、事实一致性
//!
//! 每条候选发言在写入历史前经过 TurnValidator::review：
//! - 与最近 3 条发言高度重复 ⇒ 直接丢弃
//! - 安全 / 事实问题按 ValidationPolicy 决定丢弃还是仅记录

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::knowledge::KnowledgeSnippet;
use crate::script::types::Turn;

/// 重复检测
#[derive(Debug, Clone)]
pub struct RepetitionDetector {
    pub window: usize,
    pub ngram: usize,
    pub threshold: f64,
    pub min_chars: usize,
}

impl Default for RepetitionDetector {
    fn default() -> Self {
        Self {
            window: 3,
            ngram: 10,
            threshold: 0.5,
            min_chars: 20,
        }
    }
}

impl RepetitionDetector {
    /// candidate 的 n 字窗口中出现在 previous 里的比例
    pub fn overlap(&self, candidate: &str, previous: &str) -> f64 {
        let new: Vec<char> = candidate.trim().to_lowercase().chars().collect();
        if new.len() <= self.ngram {
            return 0.0;
        }
        let old = previous.trim().to_lowercase();
        let windows = new.len() - self.ngram;
        let hits = (0..windows)
            .filter(|&i| {
                let gram: String = new[i..i + self.ngram].iter().collect();
                old.contains(&gram)
            })
            .count();
        hits as f64 / windows as f64
    }

    /// 与最近 window 条发言之一重复
    pub fn is_duplicate(&self, candidate: &str, history: &[Turn]) -> bool {
        if candidate.trim().chars().count() <= self.min_chars {
            return false;
        }
        let start = history.len().saturating_sub(self.window);
        history[start..]
            .iter()
            .any(|t| self.overlap(candidate, &t.content) > self.threshold)
    }
}

const SENSITIVE_KEYWORDS: [(&str, &[&str]); 6] = [
    ("政治敏感", &["领导人", "颠覆政权", "政治敏感"]),
    ("暴力", &["暴力", "杀人", "伤害", "攻击", "暴打"]),
    ("色情", &["色情", "裸体"]),
    ("歧视", &["歧视", "种族"]),
    ("谣言", &["未经证实", "据说", "听说", "传闻"]),
    ("商业风险", &["投资建议", "保证赚钱", "稳赚不赔", "必涨"]),
];

const EXAGGERATIONS: [&str; 8] = ["100%", "完全", "绝对", "所有", "从不", "永远", "必然", "一定"];

fn contradiction_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (
                r"(不会|不能|没有|无法).{0,20}(但是|然而|可是).{0,20}(会|能|有|可以)",
                "可能的逻辑矛盾：前后表述不一致",
            ),
            (r"(一定|必然|肯定).{0,20}(可能|也许|或许)", "确定性与不确定性混用"),
            (r"(增加|上升|提高).{0,20}(减少|下降|降低)", "增减表述冲突"),
        ]
        .into_iter()
        .map(|(p, msg)| (Regex::new(p).expect("contradiction pattern"), msg))
        .collect()
    })
}

/// 内容安全检查：敏感词、自相矛盾、过度绝对化
#[derive(Debug, Default, Clone)]
pub struct SafetyScreener;

impl SafetyScreener {
    /// 返回问题列表，空表示通过
    pub fn screen(&self, content: &str) -> Vec<String> {
        let mut issues = Vec::new();
        for (category, keywords) in SENSITIVE_KEYWORDS {
            for kw in keywords {
                if content.contains(kw) {
                    issues.push(format!("{}：{}", category, kw));
                }
            }
        }
        for (re, msg) in contradiction_patterns() {
            if re.is_match(content) {
                issues.push(msg.to_string());
            }
        }
        let exaggerations = EXAGGERATIONS.iter().filter(|w| content.contains(*w)).count();
        if exaggerations > 2 {
            issues.push(format!("过多绝对化表述（{}处）", exaggerations));
        }
        issues
    }
}

/// 事实校验结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub confidence: f64,
    pub warnings: Vec<String>,
    pub conflicts: Vec<String>,
}

const ABSOLUTE_WORDS: [&str; 8] = ["一定", "必然", "绝对", "永远", "从不", "总是", "所有", "没有任何"];
const NEGATIONS: [&str; 5] = ["不会", "不能", "没有", "无法", "不可能"];

fn numeric_statement() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d+(?:\.\d+)?%|\d+(?:万|亿|千|百)?\p{Han}{0,3}").expect("numeric pattern")
    })
}

fn knowledge_number() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("number pattern"))
}

/// 与知识上下文比对的启发式事实检查
#[derive(Debug, Default, Clone)]
pub struct FactChecker;

impl FactChecker {
    /// 没有知识片段时返回 None
    pub fn check(&self, content: &str, snippets: &[KnowledgeSnippet]) -> Option<ValidationResult> {
        if snippets.is_empty() {
            return None;
        }
        let mut confidence = 0.8;
        let mut warnings = Vec::new();

        if ABSOLUTE_WORDS.iter().any(|w| content.contains(w)) {
            warnings.push("绝对性断言，建议保持谨慎".to_string());
            confidence *= 0.95;
        }

        let knowledge_text = snippets
            .iter()
            .take(5)
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let numeric_claims = numeric_statement().find_iter(content).count();
        if numeric_claims > 3 && knowledge_number().is_match(&knowledge_text) {
            warnings.push(format!("{}处数据陈述，建议与知识库核对", numeric_claims));
            confidence *= 0.9;
        }

        let negations: Vec<&str> = NEGATIONS.iter().copied().filter(|w| content.contains(w)).collect();
        if !negations.is_empty() && knowledge_text.chars().count() > 100 {
            warnings.push(format!("否定性表述：{}，请确保与知识库一致", negations.join("、")));
        }

        let mut conflicts = Vec::new();
        let is_valid = warnings.len() <= 2;
        if !is_valid {
            conflicts.push("多处潜在冲突，建议人工审核".to_string());
        }
        Some(ValidationResult {
            is_valid,
            confidence: (confidence * 100.0_f64).round() / 100.0,
            warnings,
            conflicts,
        })
    }
}

/// 问题是否导致丢弃
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationPolicy {
    pub enforce_safety: bool,
    pub enforce_fact_check: bool,
}

/// 丢弃原因
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "issues", rename_all = "snake_case")]
pub enum RejectReason {
    Duplicate,
    Unsafe(Vec<String>),
    FactConflict(Vec<String>),
}

/// 校验结论
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted,
    /// 保留，但记录问题
    Flagged(Vec<String>),
    Rejected(RejectReason),
}

/// 组合三项检查
#[derive(Debug, Default, Clone)]
pub struct TurnValidator {
    repetition: RepetitionDetector,
    safety: SafetyScreener,
    facts: FactChecker,
    policy: ValidationPolicy,
}

impl TurnValidator {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn review(&self, candidate: &Turn, history: &[Turn], snippets: &[KnowledgeSnippet]) -> Verdict {
        if self.repetition.is_duplicate(&candidate.content, history) {
            return Verdict::Rejected(RejectReason::Duplicate);
        }

        let mut issues = Vec::new();
        let unsafe_issues = self.safety.screen(&candidate.content);
        if !unsafe_issues.is_empty() {
            if self.policy.enforce_safety {
                return Verdict::Rejected(RejectReason::Unsafe(unsafe_issues));
            }
            issues.extend(unsafe_issues);
        }

        if let Some(result) = self.facts.check(&candidate.content, snippets) {
            if !result.is_valid {
                let mut fact_issues = result.conflicts;
                fact_issues.extend(result.warnings);
                if self.policy.enforce_fact_check {
                    return Verdict::Rejected(RejectReason::FactConflict(fact_issues));
                }
                issues.extend(fact_issues);
            }
        }

        if issues.is_empty() {
            Verdict::Accepted
        } else {
            Verdict::Flagged(issues)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::ConfidenceTier;

    const LONG: &str = "在线教育最大的价值在于打破了地域限制，让偏远地区的孩子也能听到好老师的课。";

    fn snippet(content: &str) -> KnowledgeSnippet {
        KnowledgeSnippet {
            content: content.to_string(),
            source: "notes".to_string(),
            confidence: 0.6,
            tier: ConfidenceTier::Medium,
        }
    }

    #[test]
    fn test_duplicate_of_recent_turn() {
        let detector = RepetitionDetector::default();
        let history = vec![Turn::new("A", LONG)];
        let candidate = format!("{}对吧", LONG);
        assert!(detector.is_duplicate(&candidate, &history));
        assert!(!detector.is_duplicate("我完全不同意这个看法，因为网络课堂缺少真实的师生互动和同伴压力。", &history));
    }

    #[test]
    fn test_only_last_three_turns_are_compared() {
        let detector = RepetitionDetector::default();
        let history = vec![
            Turn::new("A", LONG),
            Turn::new("B", "第二句完全不同的内容"),
            Turn::new("A", "第三句也完全不同的内容"),
            Turn::new("B", "第四句还是完全不同的内容"),
        ];
        assert!(!detector.is_duplicate(LONG, &history));
    }

    #[test]
    fn test_short_content_never_duplicate() {
        let detector = RepetitionDetector::default();
        let history = vec![Turn::new("A", "好的，我同意。")];
        assert!(!detector.is_duplicate("好的，我同意。", &history));
    }

    #[test]
    fn test_safety_screener() {
        let screener = SafetyScreener;
        assert!(screener.screen(LONG).is_empty());
        assert!(!screener.screen("这只股票稳赚不赔").is_empty());
        assert!(!screener.screen("这个方法不会失败，但是有时候能成功").is_empty());
        assert!(!screener.screen("所有人都完全认同，永远不会变").is_empty());
        assert!(screener.screen("所有人都完全认同").is_empty());
    }

    #[test]
    fn test_fact_checker() {
        let checker = FactChecker;
        assert!(checker.check(LONG, &[]).is_none());

        let knowledge = vec![snippet(&format!("2023年在线教育用户规模达到3亿。{}", "背景资料".repeat(30)))];
        let ok = checker.check(LONG, &knowledge).unwrap();
        assert!(ok.is_valid);
        assert_eq!(ok.confidence, 0.8);

        let claim = "一定会增长，用户有3亿人，收入50%，课程200门，老师10万名，学校没有办法拒绝";
        let bad = checker.check(claim, &knowledge).unwrap();
        assert!(!bad.is_valid);
        assert_eq!(bad.warnings.len(), 3);
        assert_eq!(bad.confidence, 0.68);
        assert_eq!(bad.conflicts, vec!["多处潜在冲突，建议人工审核"]);
    }

    #[test]
    fn test_policy_controls_rejection() {
        let turn = Turn::new("A", "这只股票稳赚不赔，大家放心买");
        let lenient = TurnValidator::new(ValidationPolicy::default());
        assert!(matches!(lenient.review(&turn, &[], &[]), Verdict::Flagged(_)));

        let strict = TurnValidator::new(ValidationPolicy {
            enforce_safety: true,
            enforce_fact_check: false,
        });
        assert!(matches!(
            strict.review(&turn, &[], &[]),
            Verdict::Rejected(RejectReason::Unsafe(_))
        ));
    }

    #[test]
    fn test_clean_turn_accepted() {
        let validator = TurnValidator::default();
        assert_eq!(validator.review(&Turn::new("A", LONG), &[], &[]), Verdict::Accepted);
    }
}
