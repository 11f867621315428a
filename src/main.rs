use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stage_pipeline::cli::{execute_demo, execute_sort, Cli, Commands, DemoConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG でステージのライフサイクルを確認できる
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Demo {
            count,
            filter_workers,
            map_workers,
            fold_workers,
            capacity_per_worker,
            json,
        } => {
            execute_demo(DemoConfig {
                count,
                filter_workers,
                map_workers,
                fold_workers,
                capacity_per_worker,
                json,
            })
            .await
        }
        Commands::Sort { values, json } => execute_sort(values, json).await,
    };

    if let Err(error) = result {
        eprintln!("❌ エラー: {error:#}");
        std::process::exit(1);
    }

    Ok(())
}
