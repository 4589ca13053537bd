//! 自我改进循环的错误类型
//!
//! 每个阶段只抛出自己那一类错误；控制器捕获后包装为 CycleFailure（带阶段与部分结果）。

use std::path::PathBuf;

use thiserror::Error;

use crate::llm::LlmError;

/// 改进周期中可能出现的错误（日志缺失、日志解析、模型不可用、写入失败、测试无法启动）
#[derive(Error, Debug)]
pub enum ImprovementError {
    #[error("Log file not found or unreadable: {path}: {message}")]
    NotFound { path: PathBuf, message: String },

    /// line 从 1 开始计数
    #[error("Malformed log entry at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Model unavailable: {0}")]
    ModelUnavailable(#[from] LlmError),

    #[error("Integration failed for {path}: {message}")]
    Integration { path: PathBuf, message: String },

    #[error("Test runner could not be executed: {0}")]
    TestExecution(String),
}

impl ImprovementError {
    /// 错误类别的短名，用于日志与报告
    pub fn kind(&self) -> &'static str {
        match self {
            ImprovementError::NotFound { .. } => "not_found",
            ImprovementError::Parse { .. } => "parse",
            ImprovementError::ModelUnavailable(_) => "model_unavailable",
            ImprovementError::Integration { .. } => "integration",
            ImprovementError::TestExecution(_) => "test_execution",
        }
    }
}
