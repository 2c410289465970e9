//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / 模板回退 / Mock）实现 LlmClient：complete(prompt, temperature) 返回模型原文。
//! 超时属于客户端边界，生成引擎内部不做取消。

use async_trait::async_trait;
use thiserror::Error;

/// LLM 调用失败的原因
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("empty response")]
    EmptyResponse,
}

/// LLM 客户端 trait：单轮 prompt 补全
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }

    /// 日志用的后端名称
    fn name(&self) -> &str {
        "llm"
    }
}
