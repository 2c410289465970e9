//! 分词：中英文混合，用于本地知识检索
//!
//! 中文走 jieba 搜索引擎模式，其余按非字母数字字符切分。

use std::collections::HashSet;
use std::sync::OnceLock;

use jieba_rs::Jieba;

/// 检索时忽略的虚词
const STOPWORDS: [&str; 16] = [
    "的", "了", "是", "在", "和", "与", "也", "都", "就", "而", "及", "或", "这", "那", "the", "and",
];

fn jieba() -> &'static Jieba {
    static JIEBA: OnceLock<Jieba> = OnceLock::new();
    JIEBA.get_or_init(Jieba::new)
}

fn is_han(c: char) -> bool {
    matches!(c, '\u{4E00}'..='\u{9FFF}' | '\u{3400}'..='\u{4DBF}' | '\u{F900}'..='\u{FAFF}')
}

pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(is_han)
}

fn keep(token: &str) -> bool {
    if STOPWORDS.contains(&token) {
        return false;
    }
    match token.chars().next() {
        Some(c) if is_han(c) => true,
        Some(c) => c.is_alphanumeric() && token.chars().count() > 1,
        None => false,
    }
}

/// 分词并转小写：含汉字时走 jieba 搜索引擎模式，否则按非字母数字切分；丢弃虚词、标点与单字母词
pub fn tokenize(text: &str) -> Vec<String> {
    let text = text.trim();
    let raw: Vec<String> = if contains_cjk(text) {
        jieba()
            .cut_for_search(text, true)
            .into_iter()
            .map(|s| s.trim().to_lowercase())
            .collect()
    } else {
        text.split(|c: char| !c.is_alphanumeric())
            .map(str::to_lowercase)
            .collect()
    };
    raw.into_iter().filter(|t| keep(t)).collect()
}

pub fn tokenize_to_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// 交集 / 并集；任一为空时为 0
pub fn jaccard_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let union = a.union(b).count();
    if a.is_empty() || b.is_empty() || union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}
