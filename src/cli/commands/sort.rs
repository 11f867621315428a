use crate::core::PipelineSummary;
use crate::engine::Pipeline;
use crate::services::ConsoleReporter;
use anyhow::Result;

/// 絶対値で並べ替える
pub async fn run_sort(values: Vec<i64>, quiet: bool) -> Result<(Vec<i64>, PipelineSummary)> {
    let reporter = if quiet {
        ConsoleReporter::quiet()
    } else {
        ConsoleReporter::new()
    };

    let (sorted, summary) = Pipeline::builder()
        .with_reporter(reporter)
        .from_iter(values)?
        .sort_by_key(|x: &i64| x.unsigned_abs())?
        .collect_with_summary()
        .await?;

    Ok((sorted, summary))
}

/// Execute sort command
pub async fn execute_sort(values: Vec<i64>, json: bool) -> Result<()> {
    let (sorted, summary) = run_sort(values, json).await?;

    if json {
        let report = serde_json::json!({
            "sorted": sorted,
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let rendered: Vec<String> = sorted.iter().map(i64::to_string).collect();
        println!("{}", rendered.join(" "));
    }

    Ok(())
}
