//! 素材分析层

pub mod analyzer;

pub use analyzer::{fallback_analysis, LlmMaterialAnalyzer, MaterialAnalysis, MaterialAnalyzer};
