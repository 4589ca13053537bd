use std::path::Path;
use std::sync::Arc;

use crate::core::ImprovementError;
use crate::improvement::types::{ImprovementPlan, LogEntry};
use crate::llm::LlmClient;

/// 日志分析器：读取对话日志（JSON Lines），请模型给出改进计划
pub struct LogAnalyzer {
    llm: Arc<dyn LlmClient>,
    architecture: String,
    trigger_phrase: String,
}

impl LogAnalyzer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        architecture: impl Into<String>,
        trigger_phrase: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            architecture: architecture.into(),
            trigger_phrase: trigger_phrase.into(),
        }
    }

    /// 读取日志、构造分析 prompt 并返回模型原文。
    ///
    /// 空文件不是错误：以空列表构造 prompt。任一非空行解析失败则整体失败，不做部分解析。
    pub async fn analyze(
        &self,
        log_path: &Path,
        model: &str,
    ) -> Result<ImprovementPlan, ImprovementError> {
        let entries = read_log_entries(log_path).await?;
        tracing::info!(
            path = %log_path.display(),
            entries = entries.len(),
            "Analyzing conversation log"
        );

        let prompt = self.build_prompt(&entries);
        let response = self.llm.generate(model, &prompt).await?;
        Ok(ImprovementPlan(response))
    }

    /// 指令模板固定，只有条目列表随输入变化
    pub fn build_prompt(&self, entries: &[LogEntry]) -> String {
        let logs = serde_json::to_string_pretty(entries).unwrap_or_else(|_| "[]".to_string());
        format!(
            r#"Analyze the following conversation logs of the Mario voice assistant and identify:
1. Incorrect or incomplete responses given by Mario.
2. Missing or faulty modules.
3. Suggestions for new features.
4. Optimizations specific to the host environment (CPU, memory, audio hardware).

Logs:
{logs}

Propose a detailed action plan for each point, respecting Mario's {architecture}.
Return the plan as a numbered list. For every module that should be written, add a line of the form
"{trigger} <module_name>." where <module_name> is a snake_case identifier."#,
            logs = logs,
            architecture = self.architecture,
            trigger = self.trigger_phrase,
        )
    }
}

/// 逐行解析日志；行号从 1 开始，空白行跳过
pub async fn read_log_entries(log_path: &Path) -> Result<Vec<LogEntry>, ImprovementError> {
    let content = tokio::fs::read_to_string(log_path)
        .await
        .map_err(|e| ImprovementError::NotFound {
            path: log_path.to_path_buf(),
            message: e.to_string(),
        })?;

    parse_log_lines(&content)
}

pub fn parse_log_lines(content: &str) -> Result<Vec<LogEntry>, ImprovementError> {
    let mut entries = Vec::new();
    for (i, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry: LogEntry = serde_json::from_str(line).map_err(|e| ImprovementError::Parse {
            line: i + 1,
            message: e.to_string(),
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient};
    use std::io::Write;

    fn analyzer(mock: Arc<MockLlmClient>) -> LogAnalyzer {
        LogAnalyzer::new(mock, "layered architecture", "generate code for")
    }

    fn write_log(lines: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(lines.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_analyze_returns_completion_verbatim() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_response("1. Improve greetings\n2. generate code for weather_adapter.");
        let log = write_log(
            "{\"role\": \"user\", \"content\": \"Quel temps fait-il ?\"}\n\n{\"role\": \"assistant\", \"content\": \"Je ne sais pas.\"}\n",
        );

        let plan = analyzer(mock.clone()).analyze(log.path(), "codellama").await.unwrap();
        assert_eq!(plan.as_str(), "1. Improve greetings\n2. generate code for weather_adapter.");

        let prompts = mock.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Quel temps fait-il ?"));
        assert!(prompts[0].contains("Missing or faulty modules"));
        assert_eq!(mock.models(), vec!["codellama"]);
    }

    #[tokio::test]
    async fn test_empty_log_still_produces_plan() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_response("1. Nothing to report");
        let log = write_log("");

        let plan = analyzer(mock.clone()).analyze(log.path(), "codellama").await.unwrap();
        assert!(!plan.is_empty());
        assert!(mock.prompts()[0].contains("[]"));
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let mock = Arc::new(MockLlmClient::new());
        let err = analyzer(mock.clone())
            .analyze(Path::new("/definitely/not/here.jsonl"), "codellama")
            .await
            .unwrap_err();
        assert!(matches!(err, ImprovementError::NotFound { .. }));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_line_names_line_number() {
        let mock = Arc::new(MockLlmClient::new());
        let log = write_log("{\"role\": \"user\"}\n\nnot json at all\n{\"role\": \"assistant\"}\n");

        let err = analyzer(mock.clone()).analyze(log.path(), "codellama").await.unwrap_err();
        match err {
            ImprovementError::Parse { line, .. } => assert_eq!(line, 3),
            other => panic!("Expected Parse, got {:?}", other),
        }
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn test_non_object_line_is_rejected() {
        let err = parse_log_lines("[1, 2, 3]\n").unwrap_err();
        assert!(matches!(err, ImprovementError::Parse { line: 1, .. }));
    }

    #[tokio::test]
    async fn test_model_failure_is_model_unavailable() {
        let mock = Arc::new(MockLlmClient::new());
        mock.push_error(LlmError::Status { status: 500, body: "boom".into() });
        let log = write_log("{\"role\": \"user\"}\n");

        let err = analyzer(mock).analyze(log.path(), "codellama").await.unwrap_err();
        assert!(matches!(err, ImprovementError::ModelUnavailable(_)));
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let mock = Arc::new(MockLlmClient::new());
        let a = analyzer(mock);
        let entries = parse_log_lines("{\"b\": 1, \"a\": \"x\"}\n").unwrap();
        assert_eq!(a.build_prompt(&entries), a.build_prompt(&entries));
        assert!(a.build_prompt(&entries).contains("generate code for <module_name>."));
    }
}
