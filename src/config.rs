//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `PODSCRIPT__*` 覆盖（双下划线表示嵌套，如 `PODSCRIPT__LLM__PROVIDER=deepseek`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub generation: GenerationSection,
    pub knowledge: KnowledgeSection,
    pub analysis: AnalysisSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "podscript".to_string(),
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：hunyuan / deepseek / openai / fallback
    pub provider: String,
    /// 为空时使用各后端的默认模型
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// 为空时依次读取 HUNYUAN_API_KEY / DEEPSEEK_API_KEY / OPENAI_API_KEY
    pub api_key: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "hunyuan".to_string(),
            model: None,
            base_url: None,
            api_key: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [generation] 段：语速、循环上限、上下文窗口与校验策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    pub words_per_minute: usize,
    pub max_iterations: usize,
    /// 继续对话 prompt 中携带的最近发言条数
    pub history_window: usize,
    /// 每个 prompt 最多引用的知识片段数
    pub knowledge_in_prompt: usize,
    pub plan_cache_capacity: usize,
    /// 安全检查不通过时丢弃发言（否则只记录）
    pub enforce_safety: bool,
    /// 事实核查不通过时丢弃发言（否则只记录）
    pub enforce_fact_check: bool,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            words_per_minute: crate::core::DEFAULT_WORDS_PER_MINUTE,
            max_iterations: crate::core::DEFAULT_MAX_ITERATIONS,
            history_window: 4,
            knowledge_in_prompt: 3,
            plan_cache_capacity: 50,
            enforce_safety: false,
            enforce_fact_check: false,
        }
    }
}

/// [knowledge] 段：检索开关、top_k、片段上限与本地语料目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KnowledgeSection {
    pub enabled: bool,
    pub top_k: usize,
    pub max_snippets: usize,
    pub cache_enabled: bool,
    /// 本地 .txt / .md 语料目录，未设置时不启用检索
    pub corpus_dir: Option<PathBuf>,
}

impl Default for KnowledgeSection {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: 3,
            max_snippets: 8,
            cache_enabled: true,
            corpus_dir: None,
        }
    }
}

/// [analysis] 段：素材分析重试策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisSection {
    pub enabled: bool,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for AnalysisSection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// 从 config 目录加载配置，环境变量 PODSCRIPT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 PODSCRIPT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PODSCRIPT")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, "hunyuan");
        assert_eq!(cfg.llm.timeouts.request, 60);
        assert_eq!(cfg.generation.words_per_minute, 175);
        assert_eq!(cfg.generation.max_iterations, 15);
        assert_eq!(cfg.knowledge.top_k, 3);
        assert_eq!(cfg.analysis.max_retries, 3);
        assert!(!cfg.generation.enforce_safety);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[llm]\nprovider = \"fallback\"\n\n[generation]\nmax_iterations = 5").unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.provider, "fallback");
        assert_eq!(cfg.generation.max_iterations, 5);
        assert_eq!(cfg.generation.history_window, 4);
        assert_eq!(cfg.analysis.retry_delay_ms, 1000);
    }
}
