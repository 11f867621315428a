use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "stage_pipeline")]
#[command(about = "Run multi-worker pipelines over closable queues")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sum of doubled odd numbers in a range: filter -> map -> fold
    Demo {
        /// Upper bound (exclusive) of the input range
        #[arg(short, long, default_value = "100")]
        count: i64,

        /// Workers for the filter stage (defaults to the number of CPUs)
        #[arg(long)]
        filter_workers: Option<usize>,

        /// Workers for the map stage (defaults to the number of CPUs)
        #[arg(long)]
        map_workers: Option<usize>,

        /// Workers for the fold (defaults to the number of CPUs)
        #[arg(long)]
        fold_workers: Option<usize>,

        /// Slots per worker in each intermediate queue
        #[arg(long, default_value = "2")]
        capacity_per_worker: usize,

        /// Print the per-stage summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Sort numbers by absolute value
    Sort {
        /// Numbers to sort
        #[arg(required = true, allow_hyphen_values = true)]
        values: Vec<i64>,

        /// Print the per-stage summary as JSON
        #[arg(long)]
        json: bool,
    },
}
