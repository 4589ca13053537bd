//! 音频输出能力
//!
//! 具体实现（扬声器 / 控制台 / 静音）在构造时注入，调用方只依赖 AudioOutput。

use std::sync::Mutex;

/// 以给定语速朗读文本，成功返回 true
pub trait AudioOutput: Send + Sync {
    fn speak(&self, text: &str, rate: f32) -> bool;
}

/// 无扬声器环境：把要朗读的内容写进日志
#[derive(Debug, Default)]
pub struct ConsoleAudioOutput;

impl AudioOutput for ConsoleAudioOutput {
    fn speak(&self, text: &str, rate: f32) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        tracing::info!(rate, "🔊 {}", text);
        true
    }
}

/// 静音实现：记录内容但不发声（测试与无头运行）
#[derive(Debug, Default)]
pub struct SilentAudioOutput {
    spoken: Mutex<Vec<String>>,
}

impl SilentAudioOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl AudioOutput for SilentAudioOutput {
    fn speak(&self, text: &str, _rate: f32) -> bool {
        match self.spoken.lock() {
            Ok(mut v) => {
                v.push(text.to_string());
                true
            }
            Err(_) => false,
        }
    }
}
