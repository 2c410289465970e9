//! 知识检索接口与内置实现
//!
//! KnowledgeProvider::search(query, top_k) 返回原始片段；可信度由 context 层计算。
//! 当前实现为 NoopKnowledge（禁用）与 InMemoryKnowledge（jieba 分词 + Jaccard），
//! 后续可接 Chroma/Qdrant 等真实向量库。

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;
use walkdir::WalkDir;

use crate::knowledge::tokenizer::{jaccard_similarity, tokenize_to_set};

/// 单段文件切块的最大字符数
const MAX_CHUNK_CHARS: usize = 500;

#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("knowledge search failed: {0}")]
    Search(String),

    #[error("failed to load knowledge from {path}: {reason}")]
    Load { path: String, reason: String },
}

/// 检索返回的原始片段
#[derive(Debug, Clone, PartialEq)]
pub struct RawKnowledge {
    pub content: String,
    pub source: String,
    pub metadata: HashMap<String, String>,
}

impl RawKnowledge {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// 来自本地文件（metadata.type == "file"）
    pub fn is_local_file(&self) -> bool {
        self.metadata.get("type").map(|t| t == "file").unwrap_or(false)
    }
}

/// 知识检索 trait
#[async_trait]
pub trait KnowledgeProvider: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RawKnowledge>, KnowledgeError>;

    /// 是否启用（Noop 实现返回 false）
    fn enabled(&self) -> bool {
        true
    }
}

/// 空实现：未配置知识库时使用
#[derive(Clone, Default)]
pub struct NoopKnowledge;

#[async_trait]
impl KnowledgeProvider for NoopKnowledge {
    async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<RawKnowledge>, KnowledgeError> {
        Ok(Vec::new())
    }

    fn enabled(&self) -> bool {
        false
    }
}

struct Entry {
    item: RawKnowledge,
    tokens: HashSet<String>,
}

/// 内存知识库：按分词后的 Jaccard 相似度检索
#[derive(Clone)]
pub struct InMemoryKnowledge {
    store: Arc<RwLock<Vec<Entry>>>,
    max_entries: usize,
}

impl InMemoryKnowledge {
    pub fn new(max_entries: usize) -> Self {
        Self {
            store: Arc::new(RwLock::new(Vec::new())),
            max_entries: max_entries.max(1),
        }
    }

    /// 存入一段文本；超出上限时丢弃最早的条目
    pub fn add(&self, item: RawKnowledge) {
        if item.content.trim().is_empty() {
            return;
        }
        let tokens = tokenize_to_set(&item.content);
        let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
        store.push(Entry { item, tokens });
        let n = store.len();
        if n > self.max_entries {
            store.drain(0..n - self.max_entries);
        }
    }

    pub fn len(&self) -> usize {
        self.store.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 递归导入目录下的 .txt / .md 文件，按段落切块；返回导入的块数
    pub fn load_dir(&self, dir: &Path) -> Result<usize, KnowledgeError> {
        if !dir.is_dir() {
            return Err(KnowledgeError::Load {
                path: dir.display().to_string(),
                reason: "not a directory".to_string(),
            });
        }

        let mut count = 0;
        for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            let is_text = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("txt") || e.eq_ignore_ascii_case("md"))
                .unwrap_or(false);
            if !entry.file_type().is_file() || !is_text {
                continue;
            }
            let text = std::fs::read_to_string(path).map_err(|e| KnowledgeError::Load {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            let source = path.display().to_string();
            for chunk in chunk_paragraphs(&text, MAX_CHUNK_CHARS) {
                self.add(RawKnowledge::new(chunk, source.clone()).with_metadata("type", "file"));
                count += 1;
            }
        }
        tracing::info!(dir = %dir.display(), chunks = count, "Knowledge corpus loaded");
        Ok(count)
    }
}

impl Default for InMemoryKnowledge {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[async_trait]
impl KnowledgeProvider for InMemoryKnowledge {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RawKnowledge>, KnowledgeError> {
        let query_tokens = tokenize_to_set(query);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }
        let store = self.store.read().unwrap_or_else(|e| e.into_inner());
        let mut scored: Vec<(f32, &RawKnowledge)> = store
            .iter()
            .map(|e| (jaccard_similarity(&query_tokens, &e.tokens), &e.item))
            .filter(|(s, _)| *s > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(top_k).map(|(_, k)| k.clone()).collect())
    }
}

/// 按空行切段；过长段落再按字符数硬切
fn chunk_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    for para in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let chars: Vec<char> = para.chars().collect();
        for piece in chars.chunks(max_chars) {
            chunks.push(piece.iter().collect());
        }
    }
    chunks
}
