// Producer - シーケンスを先頭キューへ配信

use super::completion::{supervise, StageContext, StageHandle, StageStats};
use crate::core::{PipelineError, PipelineReporter};
use crate::queue::ClosableQueue;
use std::sync::Arc;

/// Producer: イテレータの全要素を出力キューへputしてから閉じる
///
/// ワーカー1つのステージとして扱い、通常のステージと同じ完了手順で出力キューを閉じる
pub fn spawn_producer<I>(
    name: String,
    items: I,
    q_out: ClosableQueue<I::Item>,
    reporter: Arc<dyn PipelineReporter>,
) -> StageHandle
where
    I: IntoIterator + Send + 'static,
    I::IntoIter: Send,
    I::Item: Send + 'static,
{
    let context = Arc::new(StageContext::new(name, 1, reporter, q_out));

    let supervisor = {
        let context = Arc::clone(&context);
        tokio::spawn(async move {
            context.start().await;

            // イテレータ自体のパニックも監視下に置く
            let body = {
                let context = Arc::clone(&context);
                async move {
                    for item in items {
                        StageStats::bump(&context.stats.received);
                        if context.q_out.put(item).await.is_err() {
                            // チャンネルが閉じられた場合は正常終了
                            tracing::debug!(stage = %context.name, "head queue closed early, stopping producer");
                            break;
                        }
                        StageStats::bump(&context.stats.forwarded);
                    }
                    Ok::<_, PipelineError>(())
                }
            };

            supervise(0, &context, body).await;
        })
    };

    StageHandle::new(&context, supervisor)
}
