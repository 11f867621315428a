// Reducer - 入力キュー全体を消費するステージ（部分畳み込み・ソート）

use super::completion::{supervise, StageContext, StageHandle, StageStats};
use crate::core::{PipelineError, PipelineReporter};
use crate::queue::ClosableQueue;
use std::cmp::Ordering;
use std::sync::Arc;

/// 入力を最後まで畳み込む
///
/// 最初のアイテムを初期値とし、番兵を先に観測した場合は `None`
pub async fn reduce_queue<T, F>(queue: &ClosableQueue<T>, reduce: &F) -> Option<T>
where
    F: Fn(T, T) -> T,
{
    let mut accumulator = queue.next().await?;
    while let Some(item) = queue.next().await {
        accumulator = reduce(accumulator, item);
    }
    Some(accumulator)
}

/// 最後の終了者なら、もう読まれない入力キューを閉じる
fn abandon_input<T>(stage: &str, was_last: bool, q_in: &ClosableQueue<T>) {
    if was_last && q_in.close() {
        tracing::debug!(stage, "input queue abandoned by finished stage");
    }
}

/// N個の部分畳み込みワーカーを起動
///
/// 各ワーカーは共有の入力キューから取り出した分だけを畳み込み、部分結果を出力キューへ送る
pub fn spawn_partial_reducers<T, F>(
    name: String,
    reduce: Arc<F>,
    n_workers: usize,
    q_in: ClosableQueue<T>,
    q_out: ClosableQueue<T>,
    reporter: Arc<dyn PipelineReporter>,
) -> StageHandle
where
    T: Send + 'static,
    F: Fn(T, T) -> T + Send + Sync + 'static,
{
    let context = Arc::new(StageContext::new(name, n_workers, reporter, q_out));

    let supervisor = {
        let context = Arc::clone(&context);
        tokio::spawn(async move {
            context.start().await;

            let handles: Vec<_> = (0..n_workers)
                .map(|worker_id| {
                    let context = Arc::clone(&context);
                    let reduce = Arc::clone(&reduce);
                    let q_in = q_in.clone();
                    tokio::spawn(async move {
                        let body = {
                            let context = Arc::clone(&context);
                            let q_in = q_in.clone();
                            async move {
                                let counting = |accumulator: T, item: T| {
                                    StageStats::bump(&context.stats.received);
                                    reduce(accumulator, item)
                                };

                                if let Some(partial) = reduce_queue(&q_in, &counting).await {
                                    // 初期値として取り出した最初のアイテム分
                                    StageStats::bump(&context.stats.received);
                                    if context.q_out.put(partial).await.is_ok() {
                                        StageStats::bump(&context.stats.forwarded);
                                    }
                                }
                                Ok::<_, PipelineError>(())
                            }
                        };

                        let (_, was_last) = supervise(worker_id, &context, body).await;
                        abandon_input(&context.name, was_last, &q_in);
                    })
                })
                .collect();

            for handle in handles {
                if let Err(error) = handle.await {
                    tracing::error!(stage = %context.name, %error, "reducer task aborted");
                }
            }
        })
    };

    StageHandle::new(&context, supervisor)
}

/// 入力を全て受け取ってから並べ替えて転送するステージ
///
/// 上流の全ての処理が終わるまで下流には何も流れない
pub fn spawn_sorter<T, F>(
    name: String,
    compare: F,
    q_in: ClosableQueue<T>,
    q_out: ClosableQueue<T>,
    reporter: Arc<dyn PipelineReporter>,
) -> StageHandle
where
    T: Send + 'static,
    F: Fn(&T, &T) -> Ordering + Send + 'static,
{
    let context = Arc::new(StageContext::new(name, 1, reporter, q_out));

    let supervisor = {
        let context = Arc::clone(&context);
        tokio::spawn(async move {
            context.start().await;

            let body = {
                let context = Arc::clone(&context);
                let q_in = q_in.clone();
                async move {
                    let mut items = q_in.collect().await;
                    context
                        .stats
                        .received
                        .fetch_add(items.len(), std::sync::atomic::Ordering::Relaxed);
                    items.sort_by(|a, b| compare(a, b));

                    for item in items {
                        if context.q_out.put(item).await.is_err() {
                            break;
                        }
                        StageStats::bump(&context.stats.forwarded);
                    }
                    Ok::<_, PipelineError>(())
                }
            };

            let (_, was_last) = supervise(0, &context, body).await;
            abandon_input(&context.name, was_last, &q_in);
        })
    };

    StageHandle::new(&context, supervisor)
}
