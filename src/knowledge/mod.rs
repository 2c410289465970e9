//! 知识层：检索接口、本地知识库、上下文聚合与可信度评分

pub mod confidence;
pub mod context;
pub mod provider;
pub mod tokenizer;

pub use confidence::{score_confidence, ConfidenceTier};
pub use context::{gather_context, KnowledgeContext, KnowledgeSnippet};
pub use provider::{InMemoryKnowledge, KnowledgeError, KnowledgeProvider, NoopKnowledge, RawKnowledge};
