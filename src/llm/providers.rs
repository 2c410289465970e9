//! 按配置选择 LLM 后端
//!
//! 混元 / DeepSeek / OpenAI 均提供 OpenAI 兼容接口，只是 base_url 与默认模型不同。
//! 没有可用 API Key（或是占位符）时使用模板回退客户端，生成引擎对此无感知。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::llm::{LlmClient, OpenAiClient, TemplateFallbackClient};

pub const HUNYUAN_BASE_URL: &str = "https://api.hunyuan.cloud.tencent.com/v1";
pub const HUNYUAN_MODEL: &str = "hunyuan-turbos-latest";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const OPENAI_MODEL: &str = "gpt-4o-mini";

/// 仅为示例占位、不能真正调用的 Key
const PLACEHOLDER_KEYS: [&str; 4] = [
    "your_actual_deepseek_api_key_here",
    "your_valid_hunyuan_api_key_here",
    "your_openai_api_key_here",
    "sk-placeholder",
];

fn usable_key(key: Option<String>) -> Option<String> {
    key.map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty() && !PLACEHOLDER_KEYS.contains(&k.as_str()))
}

/// 解析 API Key：配置优先，其次 HUNYUAN_API_KEY / DEEPSEEK_API_KEY / OPENAI_API_KEY
fn resolve_api_key(cfg: &AppConfig, provider: &str) -> Option<String> {
    if let Some(key) = usable_key(cfg.llm.api_key.clone()) {
        return Some(key);
    }
    let env_names: &[&str] = match provider {
        "deepseek" => &["DEEPSEEK_API_KEY", "OPENAI_API_KEY"],
        "openai" => &["OPENAI_API_KEY"],
        _ => &["HUNYUAN_API_KEY", "DEEPSEEK_API_KEY", "OPENAI_API_KEY"],
    };
    env_names
        .iter()
        .find_map(|name| usable_key(std::env::var(name).ok()))
}

/// 根据 [llm] 段创建客户端
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    if provider == "fallback" || provider == "template" {
        tracing::info!("LLM provider set to template fallback");
        return Arc::new(TemplateFallbackClient::new());
    }

    let Some(api_key) = resolve_api_key(cfg, &provider) else {
        tracing::warn!(provider = %provider, "No usable API key configured, using template fallback client");
        return Arc::new(TemplateFallbackClient::new());
    };

    let (default_base, default_model) = match provider.as_str() {
        "deepseek" => (Some(DEEPSEEK_BASE_URL), DEEPSEEK_CHAT),
        "openai" => (None, OPENAI_MODEL),
        _ => (Some(HUNYUAN_BASE_URL), HUNYUAN_MODEL),
    };
    let base_url = cfg.llm.base_url.as_deref().or(default_base);
    let model = cfg.llm.model.as_deref().unwrap_or(default_model);

    tracing::info!(provider = %provider, model = %model, base_url = ?base_url, "Using OpenAI-compatible LLM");
    Arc::new(
        OpenAiClient::new(base_url, model, &api_key).with_timeout_secs(cfg.llm.timeouts.request),
    )
}
