//! 核心层：错误与恢复、生成状态、指纹缓存

pub mod cache;
pub mod error;
pub mod recovery;
pub mod state;

pub use cache::{fingerprint, FingerprintCache};
pub use error::{RecoveryAction, ScriptError};
pub use recovery::RecoveryEngine;
pub use state::{
    contains_termination_phrase, estimate_target_word_count, GenerationPhase, GenerationState,
    DEFAULT_MAX_ITERATIONS, DEFAULT_WORDS_PER_MINUTE, TERMINATION_PHRASES,
};
