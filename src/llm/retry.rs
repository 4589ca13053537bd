//! 有界重试包装
//!
//! 只重试瞬时错误（网络、超时、5xx），每次等待 backoff * 已尝试次数；4xx 与格式错误立即返回。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};

/// 重试配置：最多重试次数（不含首次调用）与线性退避基数
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        let mut attempt: u32 = 0;
        loop {
            match self.inner.generate(model, prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries = self.config.max_retries,
                        "Model call failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(self.config.backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }

    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        self.inner.list_models().await
    }
}
