//! 文本处理：TTS 前的舞台指示清理

pub mod sanitizer;

pub use sanitizer::{Sanitizer, StageDirectionSanitizer};
