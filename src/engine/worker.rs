// Worker - 変換関数とステージ設定のラップ
//
// 変換関数は `I -> anyhow::Result<Option<O>>` の非同期関数に正規化して保持する。
// `None` は「値なし」マーカー。

use crate::core::error::{PipelineError, PipelineResult};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Sendなboxed future
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type TransformFn<I, O> = Arc<dyn Fn(I) -> BoxFuture<anyhow::Result<Option<O>>> + Send + Sync>;

/// 変換失敗を代替結果に変換するハンドラ
///
/// 失敗したエラーと元の入力を受け取り、代わりに転送する値（または値なし）を返す
pub struct ExceptionHandler<I, O> {
    handler: Arc<dyn Fn(&anyhow::Error, I) -> Option<O> + Send + Sync>,
}

impl<I, O> Clone for ExceptionHandler<I, O> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<I, O> ExceptionHandler<I, O> {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&anyhow::Error, I) -> Option<O> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
        }
    }

    /// 失敗を黙って破棄する
    pub fn ignore() -> Self {
        Self::new(|_, _| None)
    }

    pub fn handle(&self, error: &anyhow::Error, input: I) -> Option<O> {
        (self.handler)(error, input)
    }
}

impl<T> ExceptionHandler<T, T> {
    /// 失敗した入力をそのまま次のステージへ転送する
    pub fn forward_input() -> Self {
        Self::new(|_, input| Some(input))
    }
}

/// ハンドラと、失敗時に渡すための入力の複製方法
struct Recovery<I, O> {
    handler: ExceptionHandler<I, O>,
    backup: fn(&I) -> I,
}

impl<I, O> Clone for Recovery<I, O> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            backup: self.backup,
        }
    }
}

/// ステージ設定
///
/// `n_workers` が `None` の場合はパイプライン設定の既定値を使う。
/// `output_capacity` が `None` の場合は `capacity_per_worker * n_workers`。
pub struct WorkerOptions<I, O> {
    n_workers: Option<usize>,
    discard_none: bool,
    recovery: Option<Recovery<I, O>>,
    output_capacity: Option<usize>,
    name: Option<String>,
}

impl<I, O> Clone for WorkerOptions<I, O> {
    fn clone(&self) -> Self {
        Self {
            n_workers: self.n_workers,
            discard_none: self.discard_none,
            recovery: self.recovery.clone(),
            output_capacity: self.output_capacity,
            name: self.name.clone(),
        }
    }
}

impl<I, O> Default for WorkerOptions<I, O> {
    fn default() -> Self {
        Self {
            n_workers: None,
            discard_none: false,
            recovery: None,
            output_capacity: None,
            name: None,
        }
    }
}

impl<I, O> fmt::Debug for WorkerOptions<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerOptions")
            .field("n_workers", &self.n_workers)
            .field("discard_none", &self.discard_none)
            .field("exception_handler", &self.recovery.is_some())
            .field("output_capacity", &self.output_capacity)
            .field("name", &self.name)
            .finish()
    }
}

impl<I, O> WorkerOptions<I, O> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workers(mut self, n_workers: usize) -> Self {
        self.n_workers = Some(n_workers);
        self
    }

    pub fn discard_none(mut self, discard_none: bool) -> Self {
        self.discard_none = discard_none;
        self
    }

    pub fn with_output_capacity(mut self, capacity: usize) -> Self {
        self.output_capacity = Some(capacity);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 例外ハンドラを設定
    ///
    /// ハンドラへ元の入力を渡すため、変換前に入力を複製しておく
    pub fn with_exception_handler(mut self, handler: ExceptionHandler<I, O>) -> Self
    where
        I: Clone,
    {
        self.recovery = Some(Recovery {
            handler,
            backup: I::clone,
        });
        self
    }

    pub fn n_workers(&self) -> Option<usize> {
        self.n_workers
    }

    pub fn discards_none(&self) -> bool {
        self.discard_none
    }

    pub fn has_exception_handler(&self) -> bool {
        self.recovery.is_some()
    }

    pub fn output_capacity(&self) -> Option<usize> {
        self.output_capacity
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// ワーカー数の解決と検証
    pub fn resolve_workers(&self, default_workers: usize) -> PipelineResult<usize> {
        let n_workers = self.n_workers.unwrap_or(default_workers);
        if n_workers == 0 {
            return Err(PipelineError::configuration(
                "ワーカー数は1以上である必要があります",
            ));
        }
        Ok(n_workers)
    }
}

/// ステージで実行可能なワーカー定義
pub struct Worker<I, O> {
    transform: TransformFn<I, O>,
    options: WorkerOptions<I, O>,
}

impl<I, O> Clone for Worker<I, O> {
    fn clone(&self) -> Self {
        Self {
            transform: Arc::clone(&self.transform),
            options: self.options.clone(),
        }
    }
}

impl<I, O> fmt::Debug for Worker<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker").field("options", &self.options).finish()
    }
}

impl<I, O> Worker<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// 汎用コンストラクタ: 非同期・失敗可能・値なしを返せる変換
    pub fn new<F, Fut>(transform: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<O>>> + Send + 'static,
    {
        Self {
            transform: Arc::new(move |item| Box::pin(transform(item)) as BoxFuture<_>),
            options: WorkerOptions::default(),
        }
    }

    /// 同期・失敗しない変換
    pub fn from_fn<F>(transform: F) -> Self
    where
        F: Fn(I) -> O + Send + Sync + 'static,
    {
        Self::new(move |item| std::future::ready(Ok(Some(transform(item)))))
    }

    /// 同期・失敗し得る変換
    pub fn try_from_fn<F>(transform: F) -> Self
    where
        F: Fn(I) -> anyhow::Result<O> + Send + Sync + 'static,
    {
        Self::new(move |item| std::future::ready(transform(item).map(Some)))
    }

    /// 非同期・失敗し得る変換
    pub fn from_async<F, Fut>(transform: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    {
        Self::new(move |item| {
            let fut = transform(item);
            async move { fut.await.map(Some) }
        })
    }

    /// `None` を返した入力を破棄する変換（discard_none 有効）
    pub fn filter_map<F>(transform: F) -> Self
    where
        F: Fn(I) -> Option<O> + Send + Sync + 'static,
    {
        Self::new(move |item| std::future::ready(Ok(transform(item)))).discard_none(true)
    }
}

impl<I, O> Worker<I, O> {
    pub fn with_options(mut self, options: WorkerOptions<I, O>) -> Self {
        self.options = options;
        self
    }

    pub fn with_workers(mut self, n_workers: usize) -> Self {
        self.options = self.options.with_workers(n_workers);
        self
    }

    pub fn discard_none(mut self, discard_none: bool) -> Self {
        self.options = self.options.discard_none(discard_none);
        self
    }

    pub fn with_exception_handler(mut self, handler: ExceptionHandler<I, O>) -> Self
    where
        I: Clone,
    {
        self.options = self.options.with_exception_handler(handler);
        self
    }

    pub fn with_output_capacity(mut self, capacity: usize) -> Self {
        self.options = self.options.with_output_capacity(capacity);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.options = self.options.named(name);
        self
    }

    pub fn options(&self) -> &WorkerOptions<I, O> {
        &self.options
    }

    /// 変換を適用
    pub fn apply(&self, item: I) -> BoxFuture<anyhow::Result<Option<O>>> {
        (self.transform)(item)
    }

    /// ハンドラがあれば失敗時に渡す入力の複製を作る
    pub(crate) fn backup_input(&self, item: &I) -> Option<I> {
        self.options
            .recovery
            .as_ref()
            .map(|recovery| (recovery.backup)(item))
    }

    /// 変換失敗をハンドラで回復する。ハンドラ無しならエラーを返す
    pub(crate) fn recover(
        &self,
        error: anyhow::Error,
        backup: Option<I>,
    ) -> Result<Option<O>, anyhow::Error> {
        match (&self.options.recovery, backup) {
            (Some(recovery), Some(input)) => Ok(recovery.handler.handle(&error, input)),
            _ => Err(error),
        }
    }
}
