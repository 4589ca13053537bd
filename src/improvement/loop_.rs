use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::core::ImprovementError;
use crate::improvement::analyzer::LogAnalyzer;
use crate::improvement::generator::CodeGenerator;
use crate::improvement::harness::TestHarness;
use crate::improvement::integrator::ModuleIntegrator;
use crate::improvement::types::{
    CycleFailure, CycleStage, GeneratedModule, ImprovementCycleResult, ImprovementItem,
    ImprovementPlan, RejectedModule,
};
use crate::improvement::verifier::SourceVerifier;

/// 控制器参数（来自 [llm] / [improvement] 配置段）
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub model: String,
    pub trigger_phrase: String,
    pub default_category: String,
    pub architecture: String,
}

/// 改进周期控制器：分析 → 逐条生成/校验/集成 → 测试一次 → 报告
///
/// run_cycle 需要 &mut self，同一控制器不会并发跑两个周期（模块树只有一个写入者）。
pub struct ImprovementCycle {
    analyzer: LogAnalyzer,
    generator: CodeGenerator,
    verifier: Arc<dyn SourceVerifier>,
    integrator: ModuleIntegrator,
    harness: Arc<dyn TestHarness>,
    settings: CycleSettings,
    stage: CycleStage,
}

/// 周期进行中收集的部分结果，失败时原样交给 CycleFailure
struct Progress {
    id: Uuid,
    plan: Option<ImprovementPlan>,
    modules: Vec<GeneratedModule>,
    rejected: Vec<RejectedModule>,
}

impl ImprovementCycle {
    pub fn new(
        analyzer: LogAnalyzer,
        generator: CodeGenerator,
        verifier: Arc<dyn SourceVerifier>,
        integrator: ModuleIntegrator,
        harness: Arc<dyn TestHarness>,
        settings: CycleSettings,
    ) -> Self {
        Self {
            analyzer,
            generator,
            verifier,
            integrator,
            harness,
            settings,
            stage: CycleStage::Idle,
        }
    }

    /// 当前（或最后一次周期结束时）所处阶段
    pub fn stage(&self) -> CycleStage {
        self.stage
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    fn enter(&mut self, stage: CycleStage) {
        tracing::debug!(from = %self.stage, to = %stage, "Cycle stage transition");
        self.stage = stage;
    }

    fn fail(&mut self, progress: Progress, stage: CycleStage, error: ImprovementError) -> CycleFailure {
        tracing::error!(
            cycle = %progress.id,
            stage = %stage,
            kind = error.kind(),
            "Improvement cycle failed: {}",
            error
        );
        self.enter(CycleStage::Failed);
        CycleFailure {
            id: progress.id,
            stage,
            error,
            plan: progress.plan,
            modules: progress.modules,
            rejected: progress.rejected,
        }
    }

    /// 执行一次完整周期。
    ///
    /// 测试失败不是错误：返回 Ok，结果中 tests.success = false，不回滚也不重试。
    /// 任一阶段出错则返回 CycleFailure，其中带有失败阶段与此前已完成的部分。
    pub async fn run_cycle(&mut self, log_path: &Path) -> Result<ImprovementCycleResult, CycleFailure> {
        let started_at = Utc::now();
        let mut progress = Progress {
            id: Uuid::new_v4(),
            plan: None,
            modules: Vec::new(),
            rejected: Vec::new(),
        };
        tracing::info!(cycle = %progress.id, log = %log_path.display(), "Starting improvement cycle");

        self.enter(CycleStage::Analyzing);
        let plan = match self.analyzer.analyze(log_path, &self.settings.model).await {
            Ok(plan) => plan,
            Err(e) => return Err(self.fail(progress, CycleStage::Analyzing, e)),
        };
        progress.plan = Some(plan.clone());

        let items = plan.items(&self.settings.trigger_phrase);
        tracing::info!(cycle = %progress.id, items = items.len(), "Improvement plan received");

        for (idx, item) in items.iter().enumerate() {
            tracing::info!(
                "Processing item {}/{}: {} -> {}",
                idx + 1,
                items.len(),
                item.description,
                item.module_name
            );
            if let Err((stage, e)) = self.process_item(item, &mut progress).await {
                return Err(self.fail(progress, stage, e));
            }
        }

        self.enter(CycleStage::Testing);
        let tests = match self.harness.run_tests().await {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.fail(progress, CycleStage::Testing, e)),
        };
        if !tests.success {
            tracing::warn!(
                cycle = %progress.id,
                failed = tests.failed,
                "Tests failed after integration; changes are kept for review"
            );
        }

        self.enter(CycleStage::Reported);
        Ok(ImprovementCycleResult {
            id: progress.id,
            started_at,
            finished_at: Utc::now(),
            plan,
            items,
            modules: progress.modules,
            rejected: progress.rejected,
            tests,
        })
    }

    /// 单条：生成 → 校验 → 集成。校验失败记为 rejected 并返回 Ok
    async fn process_item(
        &mut self,
        item: &ImprovementItem,
        progress: &mut Progress,
    ) -> Result<(), (CycleStage, ImprovementError)> {
        let category = self.settings.default_category.clone();

        self.enter(CycleStage::Generating);
        let prompt = self.generation_prompt(item);
        let source = self
            .generator
            .generate(&prompt, &self.settings.model)
            .await
            .map_err(|e| (CycleStage::Generating, e))?;

        self.enter(CycleStage::Verifying);
        if let Err(reason) = self.verifier.verify(&item.module_name, &source).await {
            tracing::warn!(
                module = %item.module_name,
                verifier = self.verifier.name(),
                "Generated source rejected: {}",
                reason
            );
            progress.rejected.push(RejectedModule {
                name: item.module_name.clone(),
                category,
                reason,
            });
            return Ok(());
        }

        self.enter(CycleStage::Integrating);
        let path = self
            .integrator
            .integrate(&item.module_name, &source, &category)
            .await
            .map_err(|e| (CycleStage::Integrating, e))?;

        progress.modules.push(GeneratedModule {
            name: item.module_name.clone(),
            category,
            source,
            path,
        });
        Ok(())
    }

    fn generation_prompt(&self, item: &ImprovementItem) -> String {
        format!(
            "{} (module name: {}) in the Mario project, following its {}.",
            item.description.trim_end_matches('.'),
            item.module_name,
            self.settings.architecture
        )
    }
}
