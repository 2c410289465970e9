//! Podscript - 有状态的播客剧本生成引擎
//!
//! 模块划分：
//! - **analysis**: 背景素材分析（LLM + 重试 + 模板回退）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、生成状态、指纹缓存
//! - **knowledge**: 知识检索接口、本地知识库、可信度评分
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / 模板回退 / Mock）
//! - **observability**: tracing 初始化
//! - **script**: prompt、解析修复、结构规划、内容生成、校验与生成状态机
//! - **text**: 舞台指示清理

pub mod analysis;
pub mod config;
pub mod core;
pub mod knowledge;
pub mod llm;
pub mod observability;
pub mod script;
pub mod text;

pub use script::{PodcastRequest, PodcastScript, ScriptEngine, ScriptEvent};
