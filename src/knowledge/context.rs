//! 知识上下文：一次请求内的检索、去重、截断与可信度评分

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::knowledge::confidence::{score_confidence, ConfidenceTier};
use crate::knowledge::provider::{KnowledgeError, KnowledgeProvider, RawKnowledge};

/// 单个片段保留的最大字符数
pub const MAX_SNIPPET_CHARS: usize = 500;

/// 评过分的知识片段
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeSnippet {
    pub content: String,
    pub source: String,
    pub confidence: f64,
    pub tier: ConfidenceTier,
}

impl KnowledgeSnippet {
    pub fn from_raw(raw: &RawKnowledge) -> Self {
        let confidence = score_confidence(&raw.source, &raw.content, raw.is_local_file());
        Self {
            content: truncate_chars(&raw.content, MAX_SNIPPET_CHARS),
            source: raw.source.clone(),
            confidence,
            tier: ConfidenceTier::from_score(confidence),
        }
    }
}

/// 一次请求的知识上下文
#[derive(Debug, Clone, Default, Serialize)]
pub struct KnowledgeContext {
    pub topic: String,
    pub snippets: Vec<KnowledgeSnippet>,
    /// 来源 → 片段数
    pub source_summary: BTreeMap<String, usize>,
}

impl KnowledgeContext {
    pub fn empty(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    /// 前 n 个片段
    pub fn top(&self, n: usize) -> &[KnowledgeSnippet] {
        &self.snippets[..n.min(self.snippets.len())]
    }

    pub fn sources_count(&self) -> usize {
        self.source_summary.len()
    }
}

/// 超过 max 个字符时截断并追加 "..."
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

/// 查询主题本身及「主题 + 角色名」，合并去重后保留前 max_snippets 个
///
/// 主题查询失败返回错误；角色查询失败只记录日志。
pub async fn gather_context(
    provider: &dyn KnowledgeProvider,
    topic: &str,
    characters: &[String],
    top_k: usize,
    max_snippets: usize,
) -> Result<KnowledgeContext, KnowledgeError> {
    if !provider.enabled() {
        return Ok(KnowledgeContext::empty(topic));
    }

    let mut raw = provider.search(topic, top_k).await?;
    for name in characters {
        let query = format!("{} {}", topic, name);
        match provider.search(&query, top_k).await {
            Ok(items) => raw.extend(items),
            Err(e) => tracing::warn!(query = %query, error = %e, "Character knowledge query failed, skipped"),
        }
    }

    let mut seen = HashSet::new();
    let mut context = KnowledgeContext::empty(topic);
    for item in raw {
        if context.snippets.len() >= max_snippets {
            break;
        }
        if !seen.insert(item.content.clone()) {
            continue;
        }
        let snippet = KnowledgeSnippet::from_raw(&item);
        *context.source_summary.entry(snippet.source.clone()).or_insert(0) += 1;
        context.snippets.push(snippet);
    }

    tracing::info!(
        topic = %topic,
        snippets = context.snippets.len(),
        sources = context.sources_count(),
        "Knowledge context gathered"
    );
    Ok(context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// 对任意查询返回同一组结果；含 fail_marker 的查询失败
    struct FixedProvider {
        items: Vec<RawKnowledge>,
        fail_marker: Option<&'static str>,
    }

    #[async_trait]
    impl KnowledgeProvider for FixedProvider {
        async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RawKnowledge>, KnowledgeError> {
            if let Some(marker) = self.fail_marker {
                if query.contains(marker) {
                    return Err(KnowledgeError::Search("down".to_string()));
                }
            }
            Ok(self.items.iter().take(top_k).cloned().collect())
        }
    }

    fn items(n: usize) -> Vec<RawKnowledge> {
        (0..n)
            .map(|i| RawKnowledge::new(format!("片段{}", i), format!("source-{}", i % 2)))
            .collect()
    }

    #[tokio::test]
    async fn test_dedupes_and_counts_sources() {
        let provider = FixedProvider { items: items(3), fail_marker: None };
        let cast = vec!["A".to_string(), "B".to_string()];
        let ctx = gather_context(&provider, "话题", &cast, 3, 8).await.unwrap();
        assert_eq!(ctx.snippets.len(), 3);
        assert_eq!(ctx.source_summary.get("source-0"), Some(&2));
        assert_eq!(ctx.sources_count(), 2);
    }

    #[tokio::test]
    async fn test_max_snippets() {
        let provider = FixedProvider { items: items(20), fail_marker: None };
        let ctx = gather_context(&provider, "话题", &[], 20, 8).await.unwrap();
        assert_eq!(ctx.snippets.len(), 8);
    }

    #[tokio::test]
    async fn test_primary_failure_is_error_character_failure_is_skipped() {
        let provider = FixedProvider { items: items(2), fail_marker: Some("话题") };
        assert!(gather_context(&provider, "话题", &[], 3, 8).await.is_err());

        let provider = FixedProvider { items: items(2), fail_marker: Some("B") };
        let cast = vec!["A".to_string(), "B".to_string()];
        let ctx = gather_context(&provider, "话题", &cast, 3, 8).await.unwrap();
        assert_eq!(ctx.snippets.len(), 2);
    }

    #[test]
    fn test_truncate() {
        let long = "字".repeat(600);
        let cut = truncate_chars(&long, MAX_SNIPPET_CHARS);
        assert_eq!(cut.chars().count(), 503);
        assert!(cut.ends_with("..."));
        assert_eq!(truncate_chars("短", 500), "短");
    }
}
