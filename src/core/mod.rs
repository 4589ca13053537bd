//! 核心层：错误类型与周期构建器

pub mod builder;
pub mod error;

pub use builder::CycleBuilder;
pub use error::ImprovementError;
