// stage_pipeline - 閉鎖可能キューで連結するマルチワーカーパイプライン
//
// レイヤー構成:
// - core: エラー、トレイト、共通データ型
// - queue: 閉鎖可能なFIFOキュー
// - services: 設定と報告の具象実装
// - engine: ワーカープール、完了伝播、Pipelineビルダー
// - cli: コマンドライン

pub mod cli;
pub mod core;
pub mod engine;
pub mod queue;
pub mod services;

pub use crate::core::{
    ErrorSeverity, Next, PipelineConfig, PipelineError, PipelineReporter, PipelineResult,
    PipelineSummary, QueueClosed, StageState, StageSummary, TryPutError,
};
pub use engine::{ExceptionHandler, Pipeline, PipelineBuilder, StageHandle, Worker, WorkerOptions};
pub use queue::ClosableQueue;
pub use services::{ConsoleReporter, DefaultPipelineConfig, MemoryReporter, NoOpReporter};
