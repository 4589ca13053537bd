//! 自我改进循环：日志分析 → 代码生成 → 校验 → 集成 → 测试

pub mod analyzer;
pub mod generator;
pub mod harness;
pub mod integrator;
pub mod loop_;
pub mod types;
pub mod verifier;

pub use analyzer::LogAnalyzer;
pub use generator::CodeGenerator;
pub use harness::{CommandTestHarness, TestHarness};
pub use integrator::ModuleIntegrator;
pub use loop_::{CycleSettings, ImprovementCycle};
pub use types::{
    CycleFailure, CycleStage, GeneratedModule, ImprovementCycleResult, ImprovementItem,
    ImprovementPlan, LogEntry, RejectedModule, TestOutcome,
};
pub use verifier::{
    CommandVerifier, DelimiterVerifier, NoopVerifier, SourceSyntax, SourceVerifier,
};
