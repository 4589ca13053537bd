//! LLM 层：生成式模型客户端抽象与实现（Ollama / 重试包装 / Mock）

pub mod mock;
pub mod ollama;
pub mod retry;
pub mod traits;

pub use mock::MockLlmClient;
pub use ollama::{OllamaClient, DEFAULT_BASE_URL};
pub use retry::{RetryConfig, RetryingLlmClient};
pub use traits::{LlmClient, LlmError};
