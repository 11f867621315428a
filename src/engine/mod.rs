// エンジン層 - ワーカープールとステージ連結
// キュー層の上でステージを起動し、完了を下流へ伝播する

pub mod completion;
pub mod consumer;
pub mod pipeline;
pub mod producer;
pub mod reducer;
pub mod worker;

pub use completion::{StageCounter, StageHandle};
pub use consumer::spawn_consumers;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use producer::spawn_producer;
pub use reducer::{reduce_queue, spawn_partial_reducers, spawn_sorter};
pub use worker::{BoxFuture, ExceptionHandler, Worker, WorkerOptions};
