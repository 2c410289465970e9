//! Podscript 命令行入口
//!
//! 用法：`podscript <request.json> [--config config.toml]`，剧本 JSON 输出到 stdout，日志输出到 stderr。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use podscript::analysis::LlmMaterialAnalyzer;
use podscript::config::{load_config, AppConfig};
use podscript::knowledge::{InMemoryKnowledge, KnowledgeProvider, NoopKnowledge};
use podscript::llm::{create_llm_from_config, LlmClient};
use podscript::script::GenerationSettings;
use podscript::{PodcastRequest, ScriptEngine};

/// Podscript - 播客剧本生成
#[derive(Parser, Debug)]
#[command(name = "podscript", version, about, long_about = None)]
struct Cli {
    /// 剧本请求 JSON 文件
    request: PathBuf,

    /// 配置文件（默认按 config/default.toml 等位置查找）
    #[arg(long)]
    config: Option<PathBuf>,
}

/// 配置了语料目录且启用检索时加载本地知识库
fn build_knowledge(cfg: &AppConfig) -> anyhow::Result<Arc<dyn KnowledgeProvider>> {
    match (&cfg.knowledge.corpus_dir, cfg.knowledge.enabled) {
        (Some(dir), true) => {
            let store = InMemoryKnowledge::default();
            store
                .load_dir(dir)
                .with_context(|| format!("Failed to load knowledge corpus from {}", dir.display()))?;
            Ok(Arc::new(store))
        }
        _ => Ok(Arc::new(NoopKnowledge)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    podscript::observability::init();

    let cli = Cli::parse();

    let cfg = load_config(cli.config).context("Failed to load config")?;
    let raw = std::fs::read_to_string(&cli.request)
        .with_context(|| format!("Failed to read {}", cli.request.display()))?;
    let request: PodcastRequest =
        serde_json::from_str(&raw).context("Request file is not a valid podcast request")?;

    let llm = create_llm_from_config(&cfg);
    tracing::info!(app = %cfg.app.name, backend = llm.name(), topic = %request.topic, "Starting script generation");
    let settings = GenerationSettings::from_config(&cfg);
    let analyzer = LlmMaterialAnalyzer::new(llm.clone())
        .with_retries(settings.analysis_attempts, settings.analysis_retry_delay);
    let engine = ScriptEngine::builder(llm.clone())
        .knowledge(build_knowledge(&cfg)?)
        .analyzer(Arc::new(analyzer))
        .settings(settings)
        .build();

    let script = engine
        .generate(&request)
        .await
        .context("Script generation failed")?;
    let (prompt_tokens, completion_tokens, total_tokens) = llm.token_usage();
    tracing::info!(backend = llm.name(), prompt_tokens, completion_tokens, total_tokens, "Token usage");
    println!(
        "{}",
        serde_json::to_string_pretty(&script).context("Failed to serialize script")?
    );
    Ok(())
}
