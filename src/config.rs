//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MARIO__*` 覆盖（双下划线表示嵌套，如 `MARIO__LLM__MODEL=mistral`）。
//! 配置值在启动时加载一次，按值传入各组件构造函数，不存在进程级全局实例。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub improvement: ImprovementSection,
    pub tests: TestsSection,
}

/// [app] 段：应用名、项目根目录（测试命令与模块树相对于它）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub project_root: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "Mario".to_string(),
            project_root: PathBuf::from("."),
        }
    }
}

/// [llm] 段：本地生成服务地址、模型、超时与重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 未设置时使用 http://localhost:11434
    pub base_url: Option<String>,
    pub model: String,
    pub timeouts: LlmTimeoutsSection,
    /// 瞬时错误的最大重试次数（0 表示不重试）
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: None,
            model: default_model(),
            timeouts: LlmTimeoutsSection::default(),
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

fn default_model() -> String {
    "codellama".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次生成请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 120 }
    }
}

/// [improvement] 段：日志位置、模块树、触发短语、类别目录映射、校验器
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImprovementSection {
    pub log_path: PathBuf,
    /// 生成模块写入的根目录（相对 project_root）
    pub modules_root: PathBuf,
    pub module_extension: String,
    /// 目标语言名，写入生成 prompt
    pub language: String,
    /// 计划中表示「需要生成代码」的行所包含的短语（大小写不敏感）
    pub trigger_phrase: String,
    pub default_category: String,
    /// 架构约定描述，写入分析与生成 prompt
    pub architecture: String,
    /// 类别 → 目录名；未列出的类别退回 `<category>s`
    pub category_dirs: HashMap<String, String>,
    pub verifier: VerifierSection,
}

impl Default for ImprovementSection {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("data/conversation_history.jsonl"),
            modules_root: PathBuf::from("src"),
            module_extension: "rs".to_string(),
            language: "Rust".to_string(),
            trigger_phrase: "generate code for".to_string(),
            default_category: "adapter".to_string(),
            architecture: "layered architecture (adapters / services / controllers / models / views)"
                .to_string(),
            category_dirs: default_category_dirs(),
            verifier: VerifierSection::default(),
        }
    }
}

fn default_category_dirs() -> HashMap<String, String> {
    [
        ("adapter", "adapters"),
        ("service", "services"),
        ("controller", "controllers"),
        ("model", "models"),
        ("view", "views"),
        ("utility", "utils"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// 生成代码进入模块树前的校验方式
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum VerifierKind {
    /// 不校验，直接集成
    Off,
    /// 进程内检查：非空且括号配平；按 language 选择 Rust 或 Python 规则，其他语言不检查
    #[default]
    Delimiters,
    /// 将源码通过 stdin 交给外部检查命令，退出码 0 视为通过
    Command,
}

/// [improvement.verifier] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifierSection {
    pub kind: VerifierKind,
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for VerifierSection {
    fn default() -> Self {
        Self {
            kind: VerifierKind::default(),
            command: vec![
                "rustfmt".into(),
                "--edition".into(),
                "2021".into(),
                "--emit".into(),
                "stdout".into(),
            ],
            timeout_secs: 30,
        }
    }
}

/// [tests] 段：完整测试套件的命令与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TestsSection {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for TestsSection {
    fn default() -> Self {
        Self {
            program: "cargo".to_string(),
            args: vec!["test".to_string()],
            timeout_secs: 600,
        }
    }
}

/// 从 config 目录加载配置，环境变量 MARIO__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MARIO__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MARIO")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
