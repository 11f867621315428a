// 完了伝播 - ステージのワーカー数カウンタと出力キューの閉鎖
//
// N個のワーカーが同じ入力キューを消費する。各ワーカーは終了時に
// カウンタを1つ減らし、0にした最後のワーカーだけが出力キューを閉じる。

use crate::core::error::{PipelineError, PipelineResult};
use crate::core::{PipelineReporter, StageState, StageSummary};
use crate::queue::ClosableQueue;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// ステージ内で稼働中のワーカー数
#[derive(Debug)]
pub struct StageCounter {
    n_workers: usize,
    remaining: AtomicUsize,
    started: AtomicBool,
    closed: AtomicBool,
}

impl StageCounter {
    pub fn new(n_workers: usize) -> Self {
        Self {
            n_workers,
            remaining: AtomicUsize::new(n_workers),
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    pub fn n_workers(&self) -> usize {
        self.n_workers
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
    }

    /// ワーカー1つの終了を記録
    ///
    /// カウンタを0にした呼び出しだけが `true` を返す。0未満にはならない。
    pub fn worker_finished(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |remaining| {
                remaining.checked_sub(1)
            })
            .map(|previous| previous == 1)
            .unwrap_or(false)
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn state(&self) -> StageState {
        if self.closed.load(Ordering::Acquire) {
            return StageState::Closed;
        }
        if !self.started.load(Ordering::Acquire) {
            return StageState::Unstarted;
        }
        if self.remaining() == self.n_workers {
            StageState::Running
        } else {
            StageState::Draining
        }
    }
}

/// ステージ単位のアイテム集計
#[derive(Debug, Default)]
pub struct StageStats {
    pub received: AtomicUsize,
    pub forwarded: AtomicUsize,
    pub discarded: AtomicUsize,
    pub handled_failures: AtomicUsize,
    pub unhandled_failures: AtomicUsize,
    pub dropped_no_value: AtomicUsize,
}

impl StageStats {
    pub(crate) fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, stage: &str, counter: &StageCounter) -> StageSummary {
        StageSummary {
            stage: stage.to_string(),
            n_workers: counter.n_workers(),
            state: counter.state(),
            received: self.received.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            handled_failures: self.handled_failures.load(Ordering::Relaxed),
            unhandled_failures: self.unhandled_failures.load(Ordering::Relaxed),
            dropped_no_value: self.dropped_no_value.load(Ordering::Relaxed),
        }
    }
}

/// 1ステージの全ワーカーが共有する状態
pub(crate) struct StageContext<O> {
    pub name: String,
    pub counter: Arc<StageCounter>,
    pub stats: Arc<StageStats>,
    pub reporter: Arc<dyn PipelineReporter>,
    pub q_out: ClosableQueue<O>,
}

impl<O> StageContext<O> {
    pub fn new(
        name: String,
        n_workers: usize,
        reporter: Arc<dyn PipelineReporter>,
        q_out: ClosableQueue<O>,
    ) -> Self {
        Self {
            name,
            counter: Arc::new(StageCounter::new(n_workers)),
            stats: Arc::new(StageStats::default()),
            reporter,
            q_out,
        }
    }

    pub fn summary(&self) -> StageSummary {
        self.stats.snapshot(&self.name, &self.counter)
    }

    pub async fn start(&self) {
        self.counter.mark_started();
        tracing::debug!(stage = %self.name, n_workers = self.counter.n_workers(), "stage started");
        self.reporter
            .report_stage_started(&self.name, self.counter.n_workers())
            .await;
    }

    /// ワーカーが未処理エラーで終了したことを記録
    pub async fn worker_failed(&self, worker_id: usize, error: &PipelineError) {
        StageStats::bump(&self.stats.unhandled_failures);
        tracing::warn!(stage = %self.name, worker_id, %error, "worker stopped by unhandled failure");
        self.reporter
            .report_worker_failed(&self.name, worker_id, &error.to_string())
            .await;
    }

    /// ワーカーの終了処理。最後のワーカーなら出力キューを閉じて `true`
    pub async fn finish_worker(&self, worker_id: usize) -> bool {
        if !self.counter.worker_finished() {
            tracing::trace!(
                stage = %self.name,
                worker_id,
                remaining = self.counter.remaining(),
                "worker finished"
            );
            return false;
        }

        self.q_out.close();
        self.counter.mark_closed();
        let summary = self.summary();
        tracing::debug!(
            stage = %self.name,
            received = summary.received,
            forwarded = summary.forwarded,
            unhandled_failures = summary.unhandled_failures,
            "stage closed"
        );
        self.reporter.report_stage_closed(&summary).await;
        true
    }
}

/// パニックのペイロードから表示用メッセージを取り出す
pub(crate) fn panic_message(error: tokio::task::JoinError) -> String {
    match error.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string()),
        Err(error) => error.to_string(),
    }
}

/// ワーカー本体を監視付きで実行する
///
/// 本体を内側のタスクで動かすので、エラー終了・パニックのどちらでも
/// 失敗を記録したうえで必ず完了カウンタを減らす。
/// 戻り値の `bool` はこのワーカーが最後の終了者だったかどうか。
pub(crate) async fn supervise<O, Fut>(
    worker_id: usize,
    context: &StageContext<O>,
    body: Fut,
) -> (PipelineResult<()>, bool)
where
    Fut: Future<Output = PipelineResult<()>> + Send + 'static,
{
    let result = match tokio::spawn(body).await {
        Ok(result) => result,
        Err(error) if error.is_panic() => Err(PipelineError::worker_panicked(
            &context.name,
            worker_id,
            panic_message(error),
        )),
        Err(error) => Err(PipelineError::task(error)),
    };

    if let Err(error) = &result {
        context.worker_failed(worker_id, error).await;
    }

    let was_last = context.finish_worker(worker_id).await;
    (result, was_last)
}

/// 起動済みステージへのハンドル
pub struct StageHandle {
    name: String,
    counter: Arc<StageCounter>,
    stats: Arc<StageStats>,
    supervisor: tokio::task::JoinHandle<()>,
}

impl StageHandle {
    pub(crate) fn new<O>(context: &StageContext<O>, supervisor: tokio::task::JoinHandle<()>) -> Self {
        Self {
            name: context.name.clone(),
            counter: Arc::clone(&context.counter),
            stats: Arc::clone(&context.stats),
            supervisor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> StageState {
        self.counter.state()
    }

    pub fn summary(&self) -> StageSummary {
        self.stats.snapshot(&self.name, &self.counter)
    }

    /// 全ワーカーの終了を待ち、最終集計を返す
    pub async fn join(self) -> Result<StageSummary, PipelineError> {
        self.supervisor.await?;
        Ok(self.stats.snapshot(&self.name, &self.counter))
    }
}

impl std::fmt::Debug for StageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageHandle")
            .field("name", &self.name)
            .field("state", &self.counter.state())
            .finish()
    }
}
