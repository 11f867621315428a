// ClosableQueue - 明示的な「入力終了」シグナルを持つFIFOキュー
//
// 状態は std::sync::Mutex で保護する（クリティカルセクションは VecDeque 操作のみで、
// .await を跨いでロックを保持しない）。待機中のget/putは Notify で起こす。

use crate::core::error::{PipelineError, PipelineResult, QueueClosed, TryPutError};
use crate::core::types::Next;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

struct QueueState<T> {
    buffer: VecDeque<T>,
    closed: bool,
}

struct Shared<T> {
    state: Mutex<QueueState<T>>,
    /// None なら無制限
    capacity: Option<usize>,
    item_ready: Notify,
    space_ready: Notify,
}

/// 閉じることのできるFIFOキュー
///
/// 一度 `close()` されると:
/// * `put` は常に失敗する
/// * `get` は残っているアイテムを返し、その後は毎回 `Next::EndOfStream` を即座に返す
///
/// ハンドルは `Clone` で共有でき、全てのクローンが同じキューを指す。
pub struct ClosableQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ClosableQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for ClosableQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ClosableQueue")
            .field("capacity", &self.shared.capacity)
            .field("current_len", &state.buffer.len())
            .field("is_closed", &state.closed)
            .finish()
    }
}

impl<T> Default for ClosableQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ClosableQueue<T> {
    /// 容量無制限のキューを作成
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// 容量制限付きのキューを作成
    ///
    /// 満杯の間 `put` は空きができるまで待機する
    pub fn bounded(capacity: usize) -> PipelineResult<Self> {
        if capacity == 0 {
            return Err(PipelineError::configuration(
                "キュー容量は1以上である必要があります",
            ));
        }
        Ok(Self::with_capacity(Some(capacity)))
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    buffer: VecDeque::new(),
                    closed: false,
                }),
                capacity,
                item_ready: Notify::new(),
                space_ready: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        // ロック中にパニックし得る処理は無いので、poisonしても状態は整合している
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn has_room(&self, state: &QueueState<T>) -> bool {
        self.shared
            .capacity
            .map_or(true, |capacity| state.buffer.len() < capacity)
    }

    /// アイテムを末尾に追加
    ///
    /// 閉じられたキューへのputは失敗し、アイテムはエラーに入れて返す。
    /// 満杯で待機している間に閉じられた場合も同様。
    pub async fn put(&self, item: T) -> Result<(), QueueClosed<T>> {
        loop {
            let space = self.shared.space_ready.notified();
            tokio::pin!(space);
            // 状態を確認する前に登録しておき、close/getの通知を取りこぼさない
            space.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return Err(QueueClosed(item));
                }
                if self.has_room(&state) {
                    state.buffer.push_back(item);
                    drop(state);
                    self.shared.item_ready.notify_one();
                    return Ok(());
                }
            }

            space.await;
        }
    }

    /// 待機しないput
    pub fn try_put(&self, item: T) -> Result<(), TryPutError<T>> {
        let mut state = self.lock();
        if state.closed {
            return Err(TryPutError::Closed(item));
        }
        if !self.has_room(&state) {
            return Err(TryPutError::Full(item));
        }
        state.buffer.push_back(item);
        drop(state);
        self.shared.item_ready.notify_one();
        Ok(())
    }

    /// 最も古いアイテムを取り出す
    ///
    /// 空かつ開いている間は待機し、空かつ閉じていれば `Next::EndOfStream` を返す
    pub async fn get(&self) -> Next<T> {
        loop {
            let ready = self.shared.item_ready.notified();
            tokio::pin!(ready);
            ready.as_mut().enable();

            if let Some(next) = self.try_get() {
                return next;
            }

            ready.await;
        }
    }

    /// 待機しないget
    ///
    /// 空で開いている場合は `None`
    pub fn try_get(&self) -> Option<Next<T>> {
        let mut state = self.lock();
        if let Some(item) = state.buffer.pop_front() {
            drop(state);
            self.shared.space_ready.notify_one();
            return Some(Next::Item(item));
        }
        if state.closed {
            return Some(Next::EndOfStream);
        }
        None
    }

    /// キューを閉じる
    ///
    /// 冪等。実際に閉じた呼び出しだけが `true` を返す。
    /// 待機中の全てのget/putを起こす。
    pub fn close(&self) -> bool {
        {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
        }
        self.shared.item_ready.notify_waiters();
        self.shared.space_ready.notify_waiters();
        tracing::trace!(remaining = self.len(), "queue closed");
        true
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().buffer.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.shared.capacity
    }

    /// イテレーション: 番兵を観測するまでアイテムを返し、その後は `None`
    pub async fn next(&self) -> Option<T> {
        self.get().await.into_option()
    }

    /// 番兵まで全て取り出す
    pub async fn collect(&self) -> Vec<T> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item);
        }
        items
    }
}
