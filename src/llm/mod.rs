//! LLM 层：客户端抽象与实现（OpenAI 兼容 / 模板回退 / Mock）

pub mod fallback;
pub mod mock;
pub mod openai;
pub mod providers;
pub mod traits;

pub use fallback::TemplateFallbackClient;
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenCounter};
pub use providers::{
    create_llm_from_config, DEEPSEEK_BASE_URL, DEEPSEEK_CHAT, HUNYUAN_BASE_URL, HUNYUAN_MODEL,
    OPENAI_MODEL,
};
pub use traits::{LlmClient, LlmError};
