//! Mock 生成客户端（用于测试，无需本地模型服务）
//!
//! 按先进先出顺序返回预置的响应或错误，并记录每次调用的 (model, prompt)。
//! 队列耗尽后返回 fallback 文本（默认空字符串）。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};

#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<(String, String)>>,
    fallback: String,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 队列耗尽后的默认回复
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = text.into();
        self
    }

    pub fn push_response(&self, text: impl Into<String>) {
        self.lock_script().push_back(Ok(text.into()));
    }

    pub fn push_error(&self, err: LlmError) {
        self.lock_script().push_back(Err(err));
    }

    pub fn call_count(&self) -> usize {
        self.lock_calls().len()
    }

    /// 所有调用的 prompt，按调用顺序
    pub fn prompts(&self) -> Vec<String> {
        self.lock_calls().iter().map(|(_, p)| p.clone()).collect()
    }

    pub fn models(&self) -> Vec<String> {
        self.lock_calls().iter().map(|(m, _)| m.clone()).collect()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, LlmError>>> {
        self.script.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<(String, String)>> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        self.lock_calls().push((model.to_string(), prompt.to_string()));
        self.lock_script()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        Ok(vec!["mock".to_string()])
    }
}
