use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::ImprovementError;

/// 日志文件中的一行：任意 JSON 对象，核心不关心其字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogEntry(pub serde_json::Map<String, serde_json::Value>);

impl LogEntry {
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }
}

/// 模型返回的改进计划原文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImprovementPlan(pub String);

impl ImprovementPlan {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// 按文本顺序提取包含触发短语（大小写不敏感）的行
    pub fn items(&self, trigger_phrase: &str) -> Vec<ImprovementItem> {
        let needle = trigger_phrase.to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.0
            .lines()
            .filter(|line| line.to_lowercase().contains(&needle))
            .filter_map(ImprovementItem::from_line)
            .collect()
    }
}

impl fmt::Display for ImprovementPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 计划中一条可执行的代码生成项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImprovementItem {
    pub description: String,
    pub module_name: String,
}

impl ImprovementItem {
    /// 模块名取该行最后一个空白分隔的词，去掉末尾的句点；空行返回 None
    pub fn from_line(line: &str) -> Option<Self> {
        let description = line.trim();
        let module_name = description
            .split_whitespace()
            .last()?
            .trim_end_matches('.')
            .to_string();
        if module_name.is_empty() {
            return None;
        }
        Some(Self {
            description: description.to_string(),
            module_name,
        })
    }
}

/// 已写入模块树的生成模块；身份为 (category, name)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedModule {
    pub name: String,
    pub category: String,
    pub source: String,
    pub path: PathBuf,
}

/// 未通过校验、没有被集成的生成结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedModule {
    pub name: String,
    pub category: String,
    pub reason: String,
}

/// 一次完整测试运行的结果；测试失败是数据，不是错误
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub stdout: String,
    pub stderr: String,
    /// 被信号终止时为 None
    pub exit_code: Option<i32>,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub success: bool,
}

/// 控制器状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleStage {
    Idle,
    Analyzing,
    Generating,
    Verifying,
    Integrating,
    Testing,
    Reported,
    Failed,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CycleStage::Idle => "idle",
            CycleStage::Analyzing => "analyzing",
            CycleStage::Generating => "generating",
            CycleStage::Verifying => "verifying",
            CycleStage::Integrating => "integrating",
            CycleStage::Testing => "testing",
            CycleStage::Reported => "reported",
            CycleStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// 一次完成的改进周期（测试可能失败，但周期本身走完了）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementCycleResult {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub plan: ImprovementPlan,
    pub items: Vec<ImprovementItem>,
    pub modules: Vec<GeneratedModule>,
    pub rejected: Vec<RejectedModule>,
    pub tests: TestOutcome,
}

impl ImprovementCycleResult {
    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }

    /// 人类可读的周期报告
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Improvement cycle {}\nDuration: {} ms\nMatched items: {}\n",
            self.id,
            (self.finished_at - self.started_at).num_milliseconds(),
            self.items.len()
        );

        if self.modules.is_empty() {
            out.push_str("Integrated modules: none\n");
        } else {
            out.push_str("Integrated modules:\n");
            for m in &self.modules {
                out.push_str(&format!("  - {} [{}] -> {}\n", m.name, m.category, m.path.display()));
            }
        }

        if !self.rejected.is_empty() {
            out.push_str("Rejected modules:\n");
            for r in &self.rejected {
                out.push_str(&format!("  - {} [{}]: {}\n", r.name, r.category, r.reason));
            }
        }

        out.push_str(&format!(
            "Tests: {} ({} passed, {} failed, exit code {})\n",
            if self.tests.success { "✓ PASSED" } else { "✗ FAILED" },
            self.tests.passed,
            self.tests.failed,
            self.tests
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "none".to_string())
        ));

        if !self.tests.success && !self.tests.stderr.trim().is_empty() {
            out.push_str("Diagnostics:\n");
            out.push_str(self.tests.stderr.trim_end());
            out.push('\n');
        }

        out
    }
}

/// 周期在某阶段中止时的报告：阶段、原因，以及此前已收集的部分结果
#[derive(Debug)]
pub struct CycleFailure {
    pub id: Uuid,
    pub stage: CycleStage,
    pub error: ImprovementError,
    pub plan: Option<ImprovementPlan>,
    pub modules: Vec<GeneratedModule>,
    pub rejected: Vec<RejectedModule>,
}

impl fmt::Display for CycleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "improvement cycle {} failed while {}: {} ({} module(s) integrated before failure)",
            self.id,
            self.stage,
            self.error,
            self.modules.len()
        )
    }
}

impl std::error::Error for CycleFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
