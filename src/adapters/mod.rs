//! 外部 I/O 适配器（当前仅音频输出）

pub mod audio;

pub use audio::{AudioOutput, ConsoleAudioOutput, SilentAudioOutput};

use crate::improvement::{CycleFailure, ImprovementCycleResult};

/// 周期结束时播报的一句话
pub fn announcement(result: &Result<ImprovementCycleResult, CycleFailure>) -> String {
    match result {
        Ok(r) if r.tests.success => format!(
            "Self-improvement finished: {} module(s) integrated, all tests passed.",
            r.modules.len()
        ),
        Ok(r) => format!(
            "Self-improvement finished: {} module(s) integrated, {} test(s) failing.",
            r.modules.len(),
            r.tests.failed.max(1)
        ),
        Err(f) => format!("Self-improvement failed while {}.", f.stage),
    }
}
