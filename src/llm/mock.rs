//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按 prompt 任务行中出现的标记返回预设响应；记录收到的全部 prompt，便于断言调用次数与内容。

use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, TemplateFallbackClient};
use crate::script::prompts::task_line;

struct Rule {
    marker: String,
    response: Result<String, LlmError>,
    once: bool,
}

/// Mock 客户端：规则按注册顺序匹配，第一个命中的标记生效
#[derive(Default)]
pub struct MockLlmClient {
    rules: Mutex<Vec<Rule>>,
    prompts: Mutex<Vec<String>>,
    fallback: Option<TemplateFallbackClient>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, marker: &str, response: Result<String, LlmError>, once: bool) -> Self {
        self.rules
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Rule {
                marker: marker.to_string(),
                response,
                once,
            });
        self
    }

    /// prompt 含 marker 时总是返回 response
    pub fn on(self, marker: &str, response: impl Into<String>) -> Self {
        self.push(marker, Ok(response.into()), false)
    }

    /// 只命中一次，之后交给后续规则
    pub fn on_once(self, marker: &str, response: impl Into<String>) -> Self {
        self.push(marker, Ok(response.into()), true)
    }

    /// prompt 含 marker 时返回请求失败
    pub fn fail_on(self, marker: &str) -> Self {
        self.push(marker, Err(LlmError::Request(format!("mock failure on {}", marker))), false)
    }

    /// 未命中任何规则时使用模板回退客户端
    pub fn with_template_fallback(mut self) -> Self {
        self.fallback = Some(TemplateFallbackClient::new());
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 任务行含 marker 的 prompt 数量
    pub fn count_prompts(&self, marker: &str) -> usize {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|p| task_line(p).contains(marker))
            .count()
    }

    fn matched(&self, prompt: &str) -> Option<Result<String, LlmError>> {
        let mut rules = self.rules.lock().unwrap_or_else(|e| e.into_inner());
        let task = task_line(prompt);
        let idx = rules.iter().position(|r| task.contains(&r.marker))?;
        if rules[idx].once {
            Some(rules.remove(idx).response)
        } else {
            Some(rules[idx].response.clone())
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, LlmError> {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(prompt.to_string());

        if let Some(response) = self.matched(prompt) {
            return response;
        }
        match &self.fallback {
            Some(fallback) => fallback.complete(prompt, temperature).await,
            None => Err(LlmError::Request("no mock response configured".to_string())),
        }
    }
}
