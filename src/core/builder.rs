//! 改进周期构建器：由 AppConfig 组装模型客户端、校验器、测试执行器与控制器
//!
//! 配置按值传入，每个组件在构造时拿到自己需要的部分。

use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, VerifierKind};
use crate::improvement::{
    CodeGenerator, CommandTestHarness, CommandVerifier, CycleSettings, DelimiterVerifier,
    ImprovementCycle, LogAnalyzer, ModuleIntegrator, NoopVerifier, SourceSyntax, SourceVerifier,
    TestHarness,
};
use crate::llm::{LlmClient, LlmError, OllamaClient, RetryConfig, RetryingLlmClient};

pub struct CycleBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    harness: Option<Arc<dyn TestHarness>>,
    verifier: Option<Arc<dyn SourceVerifier>>,
}

impl CycleBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            harness: None,
            verifier: None,
        }
    }

    /// 替换模型后端（测试中注入 MockLlmClient）；仍会套上重试包装
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_harness(mut self, harness: Arc<dyn TestHarness>) -> Self {
        self.harness = Some(harness);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn SourceVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// 带重试包装的模型客户端；max_retries 为 0 时直接返回底层客户端
    pub fn build_llm(&self) -> Result<Arc<dyn LlmClient>, LlmError> {
        let base: Arc<dyn LlmClient> = match &self.llm {
            Some(llm) => llm.clone(),
            None => {
                let llm = &self.config.llm;
                let client = OllamaClient::new(llm.base_url.as_deref(), llm.timeouts.request)?;
                tracing::info!("Using local model service at {} ({})", client.base_url(), llm.model);
                Arc::new(client)
            }
        };

        if self.config.llm.max_retries == 0 {
            return Ok(base);
        }
        Ok(Arc::new(RetryingLlmClient::new(
            base,
            RetryConfig {
                max_retries: self.config.llm.max_retries,
                backoff: Duration::from_millis(self.config.llm.retry_backoff_ms),
            },
        )))
    }

    pub fn build_verifier(&self) -> Arc<dyn SourceVerifier> {
        if let Some(v) = &self.verifier {
            return v.clone();
        }
        let section = &self.config.improvement.verifier;
        match section.kind {
            VerifierKind::Off => Arc::new(NoopVerifier),
            VerifierKind::Delimiters => self.delimiter_verifier(),
            VerifierKind::Command => match CommandVerifier::new(&section.command, section.timeout_secs) {
                Some(v) => Arc::new(v),
                None => {
                    tracing::warn!("Verifier kind is 'command' but no command is configured, using delimiter check");
                    self.delimiter_verifier()
                }
            },
        }
    }

    /// 按配置的语言选择扫描规则；没有规则的语言不做括号检查
    fn delimiter_verifier(&self) -> Arc<dyn SourceVerifier> {
        let imp = &self.config.improvement;
        match SourceSyntax::detect(&imp.language, &imp.module_extension) {
            Some(syntax) => Arc::new(DelimiterVerifier::new(syntax)),
            None => {
                tracing::warn!(
                    "No delimiter rules for language '{}' (.{}), generated source is not verified",
                    imp.language,
                    imp.module_extension.trim_start_matches('.')
                );
                Arc::new(NoopVerifier)
            }
        }
    }

    pub fn build_harness(&self) -> Arc<dyn TestHarness> {
        if let Some(h) = &self.harness {
            return h.clone();
        }
        let tests = &self.config.tests;
        Arc::new(
            CommandTestHarness::new(&self.config.app.project_root, &tests.program, tests.args.clone())
                .with_timeout(tests.timeout_secs),
        )
    }

    pub fn build(self) -> Result<ImprovementCycle, LlmError> {
        let llm = self.build_llm()?;
        let verifier = self.build_verifier();
        let harness = self.build_harness();
        let imp = &self.config.improvement;

        let analyzer = LogAnalyzer::new(llm.clone(), &imp.architecture, &imp.trigger_phrase);
        let generator = CodeGenerator::new(llm, &imp.language, &imp.architecture);
        let integrator = ModuleIntegrator::new(
            self.config.app.project_root.join(&imp.modules_root),
            &imp.module_extension,
            imp.category_dirs.clone(),
        );

        Ok(ImprovementCycle::new(
            analyzer,
            generator,
            verifier,
            integrator,
            harness,
            CycleSettings {
                model: self.config.llm.model.clone(),
                trigger_phrase: imp.trigger_phrase.clone(),
                default_category: imp.default_category.clone(),
                architecture: imp.architecture.clone(),
            },
        ))
    }
}
