//! 生成式模型客户端抽象
//!
//! 所有后端（Ollama / Mock / 重试包装）实现 LlmClient：generate（非流式，阻塞到完成）。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// 模型调用失败的原因；对上层统一视为 ModelUnavailable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("model service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl LlmError {
    /// 是否值得重试：网络、超时与 5xx 可重试；4xx 与格式错误重试无意义
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Transport(_) | LlmError::Timeout(_) => true,
            LlmError::Status { status, .. } => *status >= 500,
            LlmError::MalformedResponse(_) => false,
        }
    }
}

/// 生成式模型客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 发送 prompt，返回完整补全文本
    async fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError>;

    /// 服务是否可达；默认认为可达，具体实现可覆盖
    async fn health_check(&self) -> bool {
        true
    }

    /// 服务端已安装的模型名列表；默认空
    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        Ok(Vec::new())
    }
}
