//! 剧本层：数据模型、prompt、解析修复、结构规划、内容生成、校验与生成状态机

pub mod events;
pub mod generator;
pub mod loop_;
pub mod parser;
pub mod planner;
pub mod prompts;
pub mod types;
pub mod validator;

pub use events::ScriptEvent;
pub use generator::{ContentGenerator, DEFAULT_CLOSING_LINE, DEFAULT_FAREWELL_LINE};
pub use loop_::{GenerationSettings, ScriptEngine, ScriptEngineBuilder};
pub use parser::{parse_model_json, ParseError};
pub use planner::{current_stage, fallback_plan, StructurePlanner};
pub use prompts::ContinuationInput;
pub use types::{
    Atmosphere, CharacterDepth, CharacterSpec, LanguageStyle, PodcastRequest, PodcastScript,
    ScriptMetadata, StagePlan, StopReason, Turn,
};
pub use validator::{RejectReason, TurnValidator, ValidationPolicy, ValidationResult, Verdict};
