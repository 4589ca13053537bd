use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

use crate::core::ImprovementError;
use crate::improvement::types::TestOutcome;

/// 测试套件执行器；测试失败通过 TestOutcome.success 表达，只有无法启动时才返回错误
#[async_trait]
pub trait TestHarness: Send + Sync {
    async fn run_tests(&self) -> Result<TestOutcome, ImprovementError>;
}

/// 以子进程运行整个测试套件（默认 `cargo test`），捕获 stdout / stderr
pub struct CommandTestHarness {
    project_root: PathBuf,
    program: String,
    args: Vec<String>,
    timeout_secs: u64,
}

impl CommandTestHarness {
    pub fn new(project_root: impl AsRef<Path>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
            program: program.into(),
            args,
            timeout_secs: 600,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

#[async_trait]
impl TestHarness for CommandTestHarness {
    async fn run_tests(&self) -> Result<TestOutcome, ImprovementError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.project_root)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        tracing::info!(program = %self.program, args = ?self.args, "Running test suite");
        let start = Instant::now();

        let output = tokio::time::timeout(Duration::from_secs(self.timeout_secs), cmd.output())
            .await
            .map_err(|_| {
                ImprovementError::TestExecution(format!(
                    "test run timed out after {}s",
                    self.timeout_secs
                ))
            })?
            .map_err(|e| {
                ImprovementError::TestExecution(format!("Failed to run '{}': {}", self.program, e))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let outcome = build_outcome(
            stdout,
            stderr,
            output.status.code(),
            output.status.success(),
            start.elapsed().as_millis() as u64,
        );

        tracing::info!(
            success = outcome.success,
            passed = outcome.passed,
            failed = outcome.failed,
            exit_code = ?outcome.exit_code,
            duration_ms = outcome.duration_ms,
            "Test suite finished"
        );
        Ok(outcome)
    }
}

/// 由进程结果组装 TestOutcome：退出成功且没有解析到失败用例才算通过
pub fn build_outcome(
    stdout: String,
    stderr: String,
    exit_code: Option<i32>,
    exited_ok: bool,
    duration_ms: u64,
) -> TestOutcome {
    let (passed, failed) = parse_counts(&stdout, &stderr);
    TestOutcome {
        success: exited_ok && failed == 0,
        stdout,
        stderr,
        exit_code,
        passed,
        failed,
        duration_ms,
    }
}

fn libtest_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"test result: \w+\. (\d+) passed; (\d+) failed").expect("libtest regex is valid")
    })
}

fn pytest_count_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+) (passed|failed)").expect("pytest regex is valid"))
}

/// 汇总所有 `test result:` 行（cargo 每个测试目标一行）；没有时尝试 pytest 的 `N failed, M passed` 摘要行
pub fn parse_counts(stdout: &str, stderr: &str) -> (usize, usize) {
    let mut passed = 0;
    let mut failed = 0;
    let mut found = false;

    for text in [stdout, stderr] {
        for caps in libtest_regex().captures_iter(text) {
            found = true;
            passed += caps[1].parse::<usize>().unwrap_or(0);
            failed += caps[2].parse::<usize>().unwrap_or(0);
        }
    }
    if found {
        return (passed, failed);
    }

    for text in [stdout, stderr] {
        for line in text.lines() {
            let trimmed = line.trim().trim_matches('=').trim();
            if !(trimmed.contains(" passed") || trimmed.contains(" failed")) || !trimmed.contains(" in ") {
                continue;
            }
            for caps in pytest_count_regex().captures_iter(trimmed) {
                let n = caps[1].parse::<usize>().unwrap_or(0);
                match &caps[2] {
                    "passed" => passed += n,
                    _ => failed += n,
                }
            }
        }
    }
    (passed, failed)
}
