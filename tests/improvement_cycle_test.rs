//! 改进周期集成测试：Mock 模型 + 记录型测试执行器 + 临时模块树

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mario::adapters::{announcement, AudioOutput, SilentAudioOutput};
use mario::config::{AppConfig, VerifierKind};
use mario::improvement::{CycleStage, TestHarness, TestOutcome};
use mario::llm::{LlmError, MockLlmClient};
use mario::{CycleBuilder, ImprovementError};

/// 记录调用次数，以及被调用时模块树中已存在的文件
struct RecordingHarness {
    calls: AtomicUsize,
    adapters_dir: PathBuf,
    seen_files: Mutex<Vec<String>>,
    outcome: TestOutcome,
}

impl RecordingHarness {
    fn new(adapters_dir: PathBuf, success: bool) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            adapters_dir,
            seen_files: Mutex::new(Vec::new()),
            outcome: TestOutcome {
                stdout: "test result: ...".to_string(),
                stderr: if success { String::new() } else { "assertion `left == right` failed".to_string() },
                exit_code: Some(if success { 0 } else { 101 }),
                passed: 4,
                failed: if success { 0 } else { 1 },
                duration_ms: 1,
                success,
            },
        }
    }
}

#[async_trait]
impl TestHarness for RecordingHarness {
    async fn run_tests(&self) -> Result<TestOutcome, ImprovementError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut names: Vec<String> = std::fs::read_dir(&self.adapters_dir)
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        *self.seen_files.lock().unwrap() = names;
        Ok(self.outcome.clone())
    }
}

struct BrokenHarness;

#[async_trait]
impl TestHarness for BrokenHarness {
    async fn run_tests(&self) -> Result<TestOutcome, ImprovementError> {
        Err(ImprovementError::TestExecution("cargo: command not found".to_string()))
    }
}

fn test_config(root: &Path) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.app.project_root = root.to_path_buf();
    cfg.llm.max_retries = 0;
    cfg.improvement.verifier.kind = VerifierKind::Delimiters;
    cfg
}

fn write_log(root: &Path) -> PathBuf {
    let path = root.join("conversation_history.jsonl");
    std::fs::write(
        &path,
        "{\"role\": \"user\", \"content\": \"Quel temps fait-il à Paris ?\"}\n\
         {\"role\": \"assistant\", \"content\": \"Je ne peux pas accéder à la météo.\"}\n",
    )
    .unwrap();
    path
}

fn adapters_dir(root: &Path) -> PathBuf {
    root.join("src").join("adapters")
}

#[tokio::test]
async fn test_two_items_processed_in_order_then_tested_once() {
    let dir = tempfile::tempdir().unwrap();
    let log = write_log(dir.path());

    let mock = Arc::new(MockLlmClient::new());
    mock.push_response(
        "1. Mario cannot answer weather questions; generate code for ModuleA.\n\
         2. Improve the greeting.\n\
         3. Add a timer; generate code for ModuleB.\n",
    );
    mock.push_response("```rust\npub struct ModuleA;\n```");
    mock.push_response("pub struct ModuleB;");

    let harness = Arc::new(RecordingHarness::new(adapters_dir(dir.path()), true));
    let mut cycle = CycleBuilder::new(test_config(dir.path()))
        .with_llm(mock.clone())
        .with_harness(harness.clone())
        .build()
        .unwrap();

    let result = cycle.run_cycle(&log).await.unwrap();

    assert_eq!(result.module_names(), vec!["ModuleA", "ModuleB"]);
    assert!(result.rejected.is_empty());
    assert!(result.tests.success);
    assert_eq!(cycle.stage(), CycleStage::Reported);

    // 1 次分析 + 2 次生成，生成顺序与计划行顺序一致
    let prompts = mock.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[1].contains("generate code for ModuleA"));
    assert!(prompts[2].contains("generate code for ModuleB"));

    // 测试只跑一次，且此时两个模块都已写入
    assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        *harness.seen_files.lock().unwrap(),
        vec!["ModuleA.rs".to_string(), "ModuleB.rs".to_string()]
    );

    let a = std::fs::read_to_string(adapters_dir(dir.path()).join("ModuleA.rs")).unwrap();
    assert_eq!(a, "pub struct ModuleA;\n");
    let b = std::fs::read_to_string(adapters_dir(dir.path()).join("ModuleB.rs")).unwrap();
    assert_eq!(b, "pub struct ModuleB;");
}

#[tokio::test]
async fn test_no_matching_lines_still_runs_baseline_tests() {
    let dir = tempfile::tempdir().unwrap();
    let log = write_log(dir.path());

    let mock = Arc::new(MockLlmClient::new());
    mock.push_response("1. Answer more concisely.\n2. Speak slower.\n");

    let harness = Arc::new(RecordingHarness::new(adapters_dir(dir.path()), true));
    let mut cycle = CycleBuilder::new(test_config(dir.path()))
        .with_llm(mock.clone())
        .with_harness(harness.clone())
        .build()
        .unwrap();

    let result = cycle.run_cycle(&log).await.unwrap();
    assert!(result.modules.is_empty());
    assert!(result.items.is_empty());
    assert_eq!(mock.call_count(), 1);
    assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
    assert!(!adapters_dir(dir.path()).exists());
}

#[tokio::test]
async fn test_model_failure_during_analysis_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let log = write_log(dir.path());

    let mock = Arc::new(MockLlmClient::new());
    mock.push_error(LlmError::Status {
        status: 503,
        body: "service unavailable".to_string(),
    });

    let harness = Arc::new(RecordingHarness::new(adapters_dir(dir.path()), true));
    let mut cycle = CycleBuilder::new(test_config(dir.path()))
        .with_llm(mock)
        .with_harness(harness.clone())
        .build()
        .unwrap();

    let failure = cycle.run_cycle(&log).await.unwrap_err();
    assert_eq!(failure.stage, CycleStage::Analyzing);
    assert!(matches!(failure.error, ImprovementError::ModelUnavailable(_)));
    assert!(failure.plan.is_none());
    assert!(failure.modules.is_empty());
    assert_eq!(cycle.stage(), CycleStage::Failed);

    assert_eq!(harness.calls.load(Ordering::SeqCst), 0);
    assert!(!adapters_dir(dir.path()).exists());
}

#[tokio::test]
async fn test_missing_log_fails_with_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockLlmClient::new());
    let mut cycle = CycleBuilder::new(test_config(dir.path()))
        .with_llm(mock.clone())
        .with_harness(Arc::new(RecordingHarness::new(adapters_dir(dir.path()), true)))
        .build()
        .unwrap();

    let failure = cycle.run_cycle(&dir.path().join("missing.jsonl")).await.unwrap_err();
    assert!(matches!(failure.error, ImprovementError::NotFound { .. }));
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_generation_failure_keeps_partial_results() {
    let dir = tempfile::tempdir().unwrap();
    let log = write_log(dir.path());

    let mock = Arc::new(MockLlmClient::new());
    mock.push_response("generate code for first_adapter.\ngenerate code for second_adapter.");
    mock.push_response("pub fn first() {}");
    mock.push_error(LlmError::Transport("connection reset".to_string()));

    let harness = Arc::new(RecordingHarness::new(adapters_dir(dir.path()), true));
    let mut cycle = CycleBuilder::new(test_config(dir.path()))
        .with_llm(mock)
        .with_harness(harness.clone())
        .build()
        .unwrap();

    let failure = cycle.run_cycle(&log).await.unwrap_err();
    assert_eq!(failure.stage, CycleStage::Generating);
    assert!(failure.plan.is_some());
    assert_eq!(failure.modules.len(), 1);
    assert_eq!(failure.modules[0].name, "first_adapter");
    assert!(failure.to_string().contains("generating"));
    assert_eq!(harness.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_integration_failure_keeps_earlier_modules() {
    let dir = tempfile::tempdir().unwrap();
    let log = write_log(dir.path());

    let mock = Arc::new(MockLlmClient::new());
    mock.push_response(
        "1. Add a clock; generate code for clock_adapter.\n\
         2. Add weather; generate code for `weather_adapter`.\n\
         3. Add timers; generate code for timer_adapter.\n",
    );
    mock.push_response("pub struct Clock;\n");
    mock.push_response("pub struct Weather;\n");

    let harness = Arc::new(RecordingHarness::new(adapters_dir(dir.path()), true));
    let mut cycle = CycleBuilder::new(test_config(dir.path()))
        .with_llm(mock.clone())
        .with_harness(harness.clone())
        .build()
        .unwrap();

    let failure = cycle.run_cycle(&log).await.unwrap_err();
    assert_eq!(failure.stage, CycleStage::Integrating);
    assert!(matches!(failure.error, ImprovementError::Integration { .. }));
    assert_eq!(cycle.stage(), CycleStage::Failed);

    assert!(failure.plan.is_some());
    assert_eq!(failure.modules.len(), 1);
    assert_eq!(failure.modules[0].name, "clock_adapter");
    assert!(adapters_dir(dir.path()).join("clock_adapter.rs").exists());

    // 第三条未处理，测试未运行
    assert_eq!(mock.call_count(), 3);
    assert!(!adapters_dir(dir.path()).join("timer_adapter.rs").exists());
    assert_eq!(harness.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unverifiable_source_is_rejected_not_integrated() {
    let dir = tempfile::tempdir().unwrap();
    let log = write_log(dir.path());

    let mock = Arc::new(MockLlmClient::new());
    mock.push_response("generate code for broken_adapter.\ngenerate code for good_adapter.");
    mock.push_response("pub fn broken() {\n    if true {\n");
    mock.push_response("pub fn good() {}\n");

    let harness = Arc::new(RecordingHarness::new(adapters_dir(dir.path()), true));
    let mut cycle = CycleBuilder::new(test_config(dir.path()))
        .with_llm(mock)
        .with_harness(harness.clone())
        .build()
        .unwrap();

    let result = cycle.run_cycle(&log).await.unwrap();
    assert_eq!(result.module_names(), vec!["good_adapter"]);
    assert_eq!(result.rejected.len(), 1);
    assert_eq!(result.rejected[0].name, "broken_adapter");
    assert!(!adapters_dir(dir.path()).join("broken_adapter.rs").exists());
    assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failing_tests_are_reported_not_thrown() {
    let dir = tempfile::tempdir().unwrap();
    let log = write_log(dir.path());

    let mock = Arc::new(MockLlmClient::new());
    mock.push_response("generate code for weather_adapter.");
    mock.push_response("pub fn forecast() -> &'static str { \"sunny\" }");

    let harness = Arc::new(RecordingHarness::new(adapters_dir(dir.path()), false));
    let mut cycle = CycleBuilder::new(test_config(dir.path()))
        .with_llm(mock)
        .with_harness(harness)
        .build()
        .unwrap();

    let result = cycle.run_cycle(&log).await.unwrap();
    assert!(!result.tests.success);
    assert!(result.summary().contains("assertion"));
    // 没有回滚
    assert!(adapters_dir(dir.path()).join("weather_adapter.rs").exists());

    let silent = SilentAudioOutput::new();
    assert!(silent.speak(&announcement(&Ok(result)), 1.0));
    assert!(silent.spoken()[0].contains("failing"));
}

#[tokio::test]
async fn test_runner_unavailable_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let log = write_log(dir.path());

    let mock = Arc::new(MockLlmClient::new());
    mock.push_response("generate code for clock_adapter.");
    mock.push_response("pub struct Clock;");

    let mut cycle = CycleBuilder::new(test_config(dir.path()))
        .with_llm(mock)
        .with_harness(Arc::new(BrokenHarness))
        .build()
        .unwrap();

    let failure = cycle.run_cycle(&log).await.unwrap_err();
    assert_eq!(failure.stage, CycleStage::Testing);
    assert!(matches!(failure.error, ImprovementError::TestExecution(_)));
    assert_eq!(failure.modules.len(), 1);
    assert!(announcement(&Err(failure)).contains("testing"));
}

#[tokio::test]
async fn test_transient_model_errors_are_retried_by_controller_client() {
    let dir = tempfile::tempdir().unwrap();
    let log = write_log(dir.path());

    let mock = Arc::new(MockLlmClient::new());
    mock.push_error(LlmError::Transport("connection refused".to_string()));
    mock.push_response("1. Nothing to change.");

    let mut cfg = test_config(dir.path());
    cfg.llm.max_retries = 2;
    cfg.llm.retry_backoff_ms = 0;

    let mut cycle = CycleBuilder::new(cfg)
        .with_llm(mock.clone())
        .with_harness(Arc::new(RecordingHarness::new(adapters_dir(dir.path()), true)))
        .build()
        .unwrap();

    let result = cycle.run_cycle(&log).await.unwrap();
    assert_eq!(result.plan.as_str(), "1. Nothing to change.");
    assert_eq!(mock.call_count(), 2);
}
