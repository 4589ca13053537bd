//! mario-improve：执行一次自我改进周期并打印报告
//!
//! 用法：mario-improve [--json] [--config <file>] [-h|--help] [日志路径]
//! 未给出日志路径时使用配置中的 improvement.log_path。

use std::path::PathBuf;

use anyhow::Context;
use mario::{
    adapters::{announcement, AudioOutput, ConsoleAudioOutput},
    config::load_config,
    observability, CycleBuilder,
};

const USAGE: &str = "Usage: mario-improve [--json] [--config <file>] [LOG_PATH]";

#[derive(Debug, Default, PartialEq)]
struct Args {
    json: bool,
    help: bool,
    config: Option<PathBuf>,
    log_path: Option<PathBuf>,
}

fn parse_args(argv: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut args = Args::default();
    let mut it = argv.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--json" => args.json = true,
            "-h" | "--help" => args.help = true,
            "--config" => {
                let path = it
                    .next()
                    .with_context(|| format!("--config requires a file path\n{}", USAGE))?;
                args.config = Some(PathBuf::from(path));
            }
            other if other.starts_with('-') => {
                anyhow::bail!("unknown option '{}'\n{}", other, USAGE);
            }
            other => {
                if args.log_path.is_some() {
                    anyhow::bail!("unexpected extra argument '{}'\n{}", other, USAGE);
                }
                args.log_path = Some(PathBuf::from(other));
            }
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args = parse_args(std::env::args().skip(1))?;
    if args.help {
        println!("{}", USAGE);
        return Ok(());
    }
    let cfg = load_config(args.config.clone()).context("Failed to load configuration")?;
    let log_path = args
        .log_path
        .clone()
        .unwrap_or_else(|| cfg.app.project_root.join(&cfg.improvement.log_path));

    let builder = CycleBuilder::new(cfg);
    let llm = builder.build_llm().context("Failed to create model client")?;
    if !llm.health_check().await {
        tracing::warn!("Model service health check failed; the cycle will likely fail at analysis");
    } else if let Ok(models) = llm.list_models().await {
        tracing::debug!(?models, "Available models");
    }

    let mut cycle = builder.build().context("Failed to build improvement cycle")?;
    let result = cycle.run_cycle(&log_path).await;

    ConsoleAudioOutput.speak(&announcement(&result), 1.0);

    match result {
        Ok(report) => {
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialize report")?
                );
            } else {
                println!("{}", report.summary());
                if report.tests.success {
                    println!("✅ All improvements validated.");
                } else {
                    println!("⚠️ Tests are failing; review the diagnostics above.");
                }
            }
            Ok(())
        }
        Err(failure) => {
            if let Some(plan) = &failure.plan {
                eprintln!("Plan collected before failure:\n{}", plan);
            }
            Err(anyhow::Error::new(failure))
        }
    }
}
