//! Mario - 语音助手的自我改进循环
//!
//! 模块划分：
//! - **adapters**: 外部 I/O 能力（音频输出）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与周期构建器
//! - **improvement**: 日志分析、代码生成、校验、集成、测试与周期控制器
//! - **llm**: 生成式模型客户端抽象与实现（Ollama / 重试 / Mock）
//! - **observability**: tracing 日志初始化

pub mod adapters;
pub mod config;
pub mod core;
pub mod improvement;
pub mod llm;
pub mod observability;

pub use core::{CycleBuilder, ImprovementError};
pub use improvement::{CycleFailure, ImprovementCycle, ImprovementCycleResult};
