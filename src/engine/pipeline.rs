// Pipeline - ステージを連結するビルダー
// 中間キューの確保、ステージ起動、終端での消費までをオーケストレーション

use super::completion::StageHandle;
use super::consumer::spawn_consumers;
use super::producer::spawn_producer;
use super::reducer::{reduce_queue, spawn_partial_reducers, spawn_sorter};
use super::worker::Worker;
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::{PipelineConfig, PipelineReporter, PipelineSummary, StageSummary};
use crate::queue::ClosableQueue;
use crate::services::{DefaultPipelineConfig, NoOpReporter};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::future::Future;
use std::sync::Arc;

/// 起動前の共通設定（報告先と設定）
#[derive(Clone)]
pub struct PipelineBuilder {
    reporter: Arc<dyn PipelineReporter>,
    config: Arc<dyn PipelineConfig>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            reporter: Arc::new(NoOpReporter::new()),
            config: Arc::new(DefaultPipelineConfig::default()),
        }
    }
}

impl PipelineBuilder {
    pub fn with_reporter<R>(mut self, reporter: R) -> Self
    where
        R: PipelineReporter + 'static,
    {
        self.reporter = Arc::new(reporter);
        self
    }

    pub fn with_config<C>(mut self, config: C) -> Self
    where
        C: PipelineConfig + 'static,
    {
        self.config = Arc::new(config);
        self
    }

    /// 既存のキューを先頭として使う
    pub fn from_queue<T>(self, head: ClosableQueue<T>) -> Pipeline<T> {
        Pipeline {
            tail: head,
            stages: Vec::new(),
            reporter: self.reporter,
            config: self.config,
            consuming: false,
            started_at: Utc::now(),
        }
    }

    /// シーケンスの全要素を流す先頭ステージを起動
    pub fn from_iter<I>(self, items: I) -> PipelineResult<Pipeline<I::Item>>
    where
        I: IntoIterator + Send + 'static,
        I::IntoIter: Send,
        I::Item: Send + 'static,
    {
        ensure_runtime()?;
        let head = new_stage_queue(self.config.as_ref(), 1, None)?;
        let mut pipeline = self.from_queue(head.clone());

        let handle = spawn_producer(
            pipeline.stage_name("source", None),
            items,
            head,
            Arc::clone(&pipeline.reporter),
        );
        pipeline.stages.push(handle);
        Ok(pipeline)
    }
}

fn ensure_runtime() -> PipelineResult<()> {
    tokio::runtime::Handle::try_current()
        .map(|_| ())
        .map_err(|_| PipelineError::configuration("tokioランタイムの外ではステージを起動できません"))
}

/// 設定に従ってステージの出力キューを作成
fn new_stage_queue<T>(
    config: &dyn PipelineConfig,
    n_workers: usize,
    explicit_capacity: Option<usize>,
) -> PipelineResult<ClosableQueue<T>> {
    match explicit_capacity {
        Some(capacity) => ClosableQueue::bounded(capacity),
        None if config.unbounded_queues() => Ok(ClosableQueue::new()),
        None => ClosableQueue::bounded(config.capacity_per_worker().saturating_mul(n_workers)),
    }
}

/// ステージを直列に連結したパイプライン
///
/// 各連結メソッドは即座にステージを起動し、その出力キューを新しい末尾にする。
/// 同じステージのワーカー間で出力順序は保証されない。
///
/// ```no_run
/// # async fn demo() -> stage_pipeline::PipelineResult<()> {
/// use stage_pipeline::Pipeline;
///
/// let total = Pipeline::from_iter(0..100)?
///     .filter(|x| x % 2 == 1, 10)?
///     .map(|x| x * 2, 8)?
///     .fold(|a, b| a + b, 0, 5)
///     .await?;
/// assert_eq!(total, 5000);
/// # Ok(())
/// # }
/// ```
pub struct Pipeline<T> {
    tail: ClosableQueue<T>,
    stages: Vec<StageHandle>,
    reporter: Arc<dyn PipelineReporter>,
    config: Arc<dyn PipelineConfig>,
    consuming: bool,
    started_at: DateTime<Utc>,
}

impl<T> std::fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("tail", &self.tail)
            .field("stages", &self.stages)
            .field("consuming", &self.consuming)
            .finish()
    }
}

impl Pipeline<()> {
    /// 報告先や設定を指定してから組み立てる
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }
}

impl<T> Pipeline<T>
where
    T: Send + 'static,
{
    /// 既定設定で既存のキューを先頭にする
    pub fn from_queue(head: ClosableQueue<T>) -> Self {
        PipelineBuilder::default().from_queue(head)
    }

    /// 既定設定でシーケンスから組み立てる
    pub fn from_iter<I>(items: I) -> PipelineResult<Self>
    where
        I: IntoIterator<Item = T> + Send + 'static,
        I::IntoIter: Send,
    {
        PipelineBuilder::default().from_iter(items)
    }

    /// 以降に連結するステージの報告先を差し替える
    pub fn with_reporter<R>(mut self, reporter: R) -> Self
    where
        R: PipelineReporter + 'static,
    {
        self.reporter = Arc::new(reporter);
        self
    }

    /// 以降に連結するステージの設定を差し替える
    pub fn with_config<C>(mut self, config: C) -> Self
    where
        C: PipelineConfig + 'static,
    {
        self.config = Arc::new(config);
        self
    }

    fn stage_name(&self, kind: &str, explicit: Option<&str>) -> String {
        explicit
            .map(str::to_string)
            .unwrap_or_else(|| format!("{kind}-{}", self.stages.len()))
    }

    fn ensure_chainable(&self) -> PipelineResult<()> {
        if self.consuming {
            return Err(PipelineError::configuration(
                "出力の消費が始まった後はステージを追加できません",
            ));
        }
        ensure_runtime()
    }

    fn extend<O>(self, tail: ClosableQueue<O>, handle: StageHandle) -> Pipeline<O> {
        let mut stages = self.stages;
        stages.push(handle);
        Pipeline {
            tail,
            stages,
            reporter: self.reporter,
            config: self.config,
            consuming: false,
            started_at: self.started_at,
        }
    }

    /// ワーカーステージを連結（出力キューは設定から作成）
    pub fn chain_workers<O>(self, worker: Worker<T, O>) -> PipelineResult<Pipeline<O>>
    where
        O: Send + 'static,
    {
        self.ensure_chainable()?;
        let n_workers = worker.options().resolve_workers(self.config.default_workers())?;
        let q_out = new_stage_queue(
            self.config.as_ref(),
            n_workers,
            worker.options().output_capacity(),
        )?;
        self.attach("stage", worker, n_workers, q_out)
    }

    /// ワーカーステージを連結（出力キューを指定）
    pub fn chain_workers_into<O>(
        self,
        worker: Worker<T, O>,
        q_out: ClosableQueue<O>,
    ) -> PipelineResult<Pipeline<O>>
    where
        O: Send + 'static,
    {
        self.ensure_chainable()?;
        if worker.options().output_capacity().is_some() {
            return Err(PipelineError::configuration(
                "出力キューを指定した場合は output_capacity を設定できません",
            ));
        }
        let n_workers = worker.options().resolve_workers(self.config.default_workers())?;
        self.attach("stage", worker, n_workers, q_out)
    }

    fn attach<O>(
        self,
        kind: &str,
        worker: Worker<T, O>,
        n_workers: usize,
        q_out: ClosableQueue<O>,
    ) -> PipelineResult<Pipeline<O>>
    where
        O: Send + 'static,
    {
        let name = self.stage_name(kind, worker.options().name());
        let handle = spawn_consumers(
            name,
            worker,
            n_workers,
            self.tail.clone(),
            q_out.clone(),
            Arc::clone(&self.reporter),
        );
        Ok(self.extend(q_out, handle))
    }

    fn chain_kind<O>(self, kind: &str, worker: Worker<T, O>) -> PipelineResult<Pipeline<O>>
    where
        O: Send + 'static,
    {
        self.ensure_chainable()?;
        let n_workers = worker.options().resolve_workers(self.config.default_workers())?;
        let q_out = new_stage_queue(
            self.config.as_ref(),
            n_workers,
            worker.options().output_capacity(),
        )?;
        self.attach(kind, worker, n_workers, q_out)
    }

    /// 各アイテムに関数を適用
    pub fn map<O, F>(self, transform: F, n_workers: usize) -> PipelineResult<Pipeline<O>>
    where
        O: Send + 'static,
        F: Fn(T) -> O + Send + Sync + 'static,
    {
        self.chain_kind("map", Worker::from_fn(transform).with_workers(n_workers))
    }

    /// 各アイテムに非同期関数を適用
    pub fn map_async<O, F, Fut>(self, transform: F, n_workers: usize) -> PipelineResult<Pipeline<O>>
    where
        O: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = O> + Send + 'static,
    {
        let worker = Worker::new(move |item| {
            let fut = transform(item);
            async move { Ok(Some(fut.await)) }
        });
        self.chain_kind("map", worker.with_workers(n_workers))
    }

    /// 述語を満たすアイテムだけを次のステージへ渡す
    pub fn filter<F>(self, predicate: F, n_workers: usize) -> PipelineResult<Pipeline<T>>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let worker = Worker::filter_map(move |item| predicate(&item).then_some(item));
        self.chain_kind("filter", worker.with_workers(n_workers))
    }

    /// 全入力を受け取ってから比較関数で並べ替える
    pub fn sort_by<F>(self, compare: F) -> PipelineResult<Pipeline<T>>
    where
        F: Fn(&T, &T) -> Ordering + Send + 'static,
    {
        self.ensure_chainable()?;
        let q_out = new_stage_queue(self.config.as_ref(), 1, None)?;
        let handle = spawn_sorter(
            self.stage_name("sort", None),
            compare,
            self.tail.clone(),
            q_out.clone(),
            Arc::clone(&self.reporter),
        );
        Ok(self.extend(q_out, handle))
    }

    /// 全入力を受け取ってからキーで並べ替える
    pub fn sort_by_key<K, F>(self, key: F) -> PipelineResult<Pipeline<T>>
    where
        K: Ord,
        F: Fn(&T) -> K + Send + 'static,
    {
        self.sort_by(move |a, b| key(a).cmp(&key(b)))
    }

    /// パイプラインを1つの値に畳み込む（終端操作）
    ///
    /// `n_workers > 1` の場合、部分結果の結合順序は不定なので
    /// `reduce` は結合的かつ可換でなければ結果が定まらない。
    pub async fn fold<F>(self, reduce: F, x0: T, n_workers: usize) -> PipelineResult<T>
    where
        F: Fn(T, T) -> T + Send + Sync + 'static,
    {
        self.ensure_chainable()?;
        if n_workers == 0 {
            return Err(PipelineError::configuration(
                "ワーカー数は1以上である必要があります",
            ));
        }

        if n_workers == 1 {
            let mut accumulator = x0;
            while let Some(item) = self.tail.next().await {
                accumulator = reduce(accumulator, item);
            }
            self.join().await?;
            return Ok(accumulator);
        }

        // 部分結果を中間キューに集め、初期値と合わせて結合する
        let interim = ClosableQueue::new();
        interim
            .try_put(x0)
            .map_err(|_| PipelineError::internal(anyhow::anyhow!("中間キューへ初期値を置けません")))?;

        let reduce = Arc::new(reduce);
        let handle = spawn_partial_reducers(
            self.stage_name("fold", None),
            Arc::clone(&reduce),
            n_workers,
            self.tail.clone(),
            interim.clone(),
            Arc::clone(&self.reporter),
        );
        let pipeline = self.extend(interim.clone(), handle);

        let result = reduce_queue(&interim, reduce.as_ref()).await;
        pipeline.join().await?;
        result.ok_or_else(|| PipelineError::internal(anyhow::anyhow!("畳み込み結果がありません")))
    }

    /// 次の出力を取り出す。番兵を観測した後は `None`
    ///
    /// 一度呼び出すとそれ以降ステージは追加できない
    pub async fn next(&mut self) -> Option<T> {
        self.consuming = true;
        self.tail.next().await
    }

    /// 全ての出力を取り出す
    pub async fn collect(mut self) -> Vec<T> {
        self.consuming = true;
        self.tail.collect().await
    }

    /// 全ての出力を取り出し、全ステージの終了を待って集計も返す
    pub async fn collect_with_summary(mut self) -> PipelineResult<(Vec<T>, PipelineSummary)> {
        self.consuming = true;
        let items = self.tail.collect().await;
        let summary = self.join().await?;
        Ok((items, summary))
    }

    /// 全ステージのタスク終了を待つ
    ///
    /// 末尾キューが容量制限付きで消費されていない場合、最後のステージは終了できない
    pub async fn join(self) -> PipelineResult<PipelineSummary> {
        let mut stages = Vec::with_capacity(self.stages.len());
        for handle in self.stages {
            stages.push(handle.join().await?);
        }
        Ok(PipelineSummary {
            stages,
            started_at: self.started_at,
            finished_at: Utc::now(),
        })
    }

    /// 各ステージの現在の集計
    pub fn stages(&self) -> Vec<StageSummary> {
        self.stages.iter().map(StageHandle::summary).collect()
    }

    pub fn tail(&self) -> &ClosableQueue<T> {
        &self.tail
    }

    /// 末尾キューを取り出す（ステージは動き続ける）
    pub fn into_queue(self) -> ClosableQueue<T> {
        self.tail
    }
}
