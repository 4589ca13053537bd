use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::core::ImprovementError;
use crate::llm::LlmClient;

/// 代码生成器：把一条改进描述包装成固定模板交给模型，返回源码文本
pub struct CodeGenerator {
    llm: Arc<dyn LlmClient>,
    language: String,
    architecture: String,
}

impl CodeGenerator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        language: impl Into<String>,
        architecture: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            language: language.into(),
            architecture: architecture.into(),
        }
    }

    /// 不做语义校验；若补全中带有代码围栏，只取第一个围栏的内容
    pub async fn generate(&self, description: &str, model: &str) -> Result<String, ImprovementError> {
        let prompt = self.build_prompt(description);
        let response = self.llm.generate(model, &prompt).await?;
        Ok(extract_code(&response))
    }

    pub fn build_prompt(&self, description: &str) -> String {
        format!(
            r#"You are writing a new module for the Mario voice assistant.

Task: {description}

Requirements:
- Write a complete, self-contained {language} module ready to be integrated as-is.
- Follow Mario's {architecture}: adapters wrap external I/O, services hold logic, controllers orchestrate.
- Do not modify or redefine existing modules.

Return only the {language} source code, without explanations."#,
            description = description,
            language = self.language,
            architecture = self.architecture,
        )
    }
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_+\-]*[ \t]*\r?\n(.*?)```").expect("fence regex is valid")
    })
}

/// 取第一个 ``` 围栏内的代码；没有围栏时返回去掉首尾空白的原文
pub fn extract_code(response: &str) -> String {
    match fence_regex().captures(response).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim_end().to_string() + "\n",
        None => response.trim().to_string(),
    }
}
