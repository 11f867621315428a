// パイプラインに関連するデータ型定義

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// キューから取り出した結果
///
/// `EndOfStream` は「これ以上アイテムは来ない」ことを表す番兵
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next<T> {
    Item(T),
    EndOfStream,
}

impl<T> Next<T> {
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Next::EndOfStream)
    }

    /// 番兵を `None` に変換
    pub fn into_option(self) -> Option<T> {
        match self {
            Next::Item(item) => Some(item),
            Next::EndOfStream => None,
        }
    }
}

/// ステージの状態遷移
///
/// `Unstarted → Running → Draining → Closed` の順にのみ進む
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StageState {
    /// ワーカー未起動
    Unstarted,
    /// 全ワーカーが稼働中
    Running,
    /// 一部のワーカーが終了済み
    Draining,
    /// 出力キューを閉じた（終端状態）
    Closed,
}

/// ステージ単位の集計
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: String,
    pub n_workers: usize,
    pub state: StageState,
    /// 入力キューから取り出したアイテム数
    pub received: usize,
    /// 出力キューへ送ったアイテム数
    pub forwarded: usize,
    /// discard_none により破棄した数
    pub discarded: usize,
    /// 例外ハンドラが吸収した失敗数
    pub handled_failures: usize,
    /// ハンドラ無しでワーカーを終了させた失敗数
    pub unhandled_failures: usize,
    /// discard_none 無しで「値なし」が返された数
    pub dropped_no_value: usize,
}

/// パイプライン全体のサマリー
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub stages: Vec<StageSummary>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineSummary {
    /// 名前でステージを検索
    pub fn stage(&self, name: &str) -> Option<&StageSummary> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// 黙って飲み込まれた失敗の総数
    pub fn total_unhandled_failures(&self) -> usize {
        self.stages.iter().map(|s| s.unhandled_failures).sum()
    }

    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    pub fn all_closed(&self) -> bool {
        self.stages.iter().all(|s| s.state == StageState::Closed)
    }
}
