// Consumer - ワーカープール
//
// 1ステージ分のN個のワーカーを起動する。全ワーカーは同じ入力キューから取り出し、
// 同じ出力キューへ送り、同じ完了カウンタを共有する。

use super::completion::{supervise, StageContext, StageHandle, StageStats};
use super::worker::Worker;
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::PipelineReporter;
use crate::queue::ClosableQueue;
use std::sync::Arc;

/// 単一ワーカーのループ
///
/// 入力キューの番兵を観測するまで取り出して変換し、結果を出力キューへ送る。
/// 閉じたキューに対するgetは毎回番兵を返すので、兄弟ワーカーも全員が番兵を観測する。
async fn consume<I, O>(
    worker_id: usize,
    worker: Arc<Worker<I, O>>,
    q_in: ClosableQueue<I>,
    context: Arc<StageContext<O>>,
) -> PipelineResult<()>
where
    I: Send + 'static,
    O: Send + 'static,
{
    let stats = &context.stats;

    while let Some(item) = q_in.next().await {
        StageStats::bump(&stats.received);

        let backup = worker.backup_input(&item);
        let outcome = match worker.apply(item).await {
            Ok(outcome) => outcome,
            Err(error) => {
                let recovered = worker
                    .recover(error, backup)
                    .map_err(|error| PipelineError::worker_transform(&context.name, worker_id, error))?;
                StageStats::bump(&stats.handled_failures);
                tracing::debug!(stage = %context.name, worker_id, "transform failure handled");
                recovered
            }
        };

        match outcome {
            Some(value) => {
                if context.q_out.put(value).await.is_err() {
                    // 出力キューが閉じられた場合は終了
                    tracing::debug!(stage = %context.name, worker_id, "output queue closed, stopping worker");
                    break;
                }
                StageStats::bump(&stats.forwarded);
            }
            None if worker.options().discards_none() => StageStats::bump(&stats.discarded),
            None => {
                StageStats::bump(&stats.dropped_no_value);
                tracing::warn!(
                    stage = %context.name,
                    worker_id,
                    "transform returned no value without discard_none; item dropped"
                );
            }
        }
    }

    Ok(())
}

/// ワーカー1つを起動
///
/// 最後のワーカーは出力キューを閉じ、もう誰も読まない入力キューも閉じて上流の待機を解放する。
pub(crate) fn spawn_single_consumer<I, O>(
    worker_id: usize,
    worker: Arc<Worker<I, O>>,
    q_in: ClosableQueue<I>,
    context: Arc<StageContext<O>>,
) -> tokio::task::JoinHandle<PipelineResult<()>>
where
    I: Send + 'static,
    O: Send + 'static,
{
    tokio::spawn(async move {
        let body = consume(worker_id, worker, q_in.clone(), Arc::clone(&context));
        let (result, was_last) = supervise(worker_id, &context, body).await;

        if was_last && q_in.close() {
            tracing::debug!(stage = %context.name, "input queue abandoned by finished stage");
        }

        result
    })
}

/// Consumers: N個のワーカーでステージを起動
pub fn spawn_consumers<I, O>(
    name: String,
    worker: Worker<I, O>,
    n_workers: usize,
    q_in: ClosableQueue<I>,
    q_out: ClosableQueue<O>,
    reporter: Arc<dyn PipelineReporter>,
) -> StageHandle
where
    I: Send + 'static,
    O: Send + 'static,
{
    let context = Arc::new(StageContext::new(name, n_workers, reporter, q_out));
    let worker = Arc::new(worker);

    let supervisor = {
        let context = Arc::clone(&context);
        tokio::spawn(async move {
            context.start().await;

            let handles: Vec<_> = (0..n_workers)
                .map(|worker_id| {
                    spawn_single_consumer(
                        worker_id,
                        Arc::clone(&worker),
                        q_in.clone(),
                        Arc::clone(&context),
                    )
                })
                .collect();

            for handle in handles {
                // ワーカーの失敗は集計済みなので結果は捨てる
                if let Err(error) = handle.await {
                    tracing::error!(stage = %context.name, %error, "worker task aborted");
                }
            }
        })
    };

    StageHandle::new(&context, supervisor)
}
