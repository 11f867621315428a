use crate::core::StageSummary;
use crate::engine::Pipeline;
use crate::services::{ConsoleReporter, DefaultPipelineConfig, MemoryReporter, ReportEvent};
use anyhow::Result;

/// Configuration struct for demo command to reduce argument count
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub count: i64,
    pub filter_workers: Option<usize>,
    pub map_workers: Option<usize>,
    pub fold_workers: Option<usize>,
    pub capacity_per_worker: usize,
    pub json: bool,
}

impl DemoConfig {
    fn workers(explicit: Option<usize>) -> usize {
        explicit.unwrap_or_else(num_cpus::get)
    }
}

/// 奇数を残し、2倍して合計する
pub async fn run_demo(config: &DemoConfig) -> Result<(i64, Vec<StageSummary>)> {
    let pipeline_config = DefaultPipelineConfig::new()
        .with_capacity_per_worker(config.capacity_per_worker);
    pipeline_config.validate()?;

    let reporter = MemoryReporter::new();
    let builder = Pipeline::builder().with_config(pipeline_config);
    let builder = if config.json {
        builder.with_reporter(reporter.clone())
    } else {
        builder.with_reporter(ConsoleReporter::new())
    };

    let total = builder
        .from_iter(0..config.count)?
        .filter(|x| x & 1 == 1, DemoConfig::workers(config.filter_workers))?
        .map(|x| x * 2, DemoConfig::workers(config.map_workers))?
        .fold(|a, b| a + b, 0, DemoConfig::workers(config.fold_workers))
        .await?;

    let stages = reporter
        .events()
        .into_iter()
        .filter_map(|event| match event {
            ReportEvent::StageClosed(summary) => Some(summary),
            _ => None,
        })
        .collect();

    Ok((total, stages))
}

/// Execute demo command
pub async fn execute_demo(config: DemoConfig) -> Result<()> {
    let (total, stages) = run_demo(&config).await?;

    if config.json {
        let report = serde_json::json!({
            "count": config.count,
            "total": total,
            "stages": stages,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("📊 Sum of doubled odd numbers below {}: {total}", config.count);
    }

    Ok(())
}
