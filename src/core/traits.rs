// パイプラインのトレイト定義
// 設定と監視の抽象化インターフェースを定義

use super::types::StageSummary;
use async_trait::async_trait;
use mockall::automock;

/// パイプラインの設定を抽象化するトレイト
#[automock]
pub trait PipelineConfig: Send + Sync {
    /// ワーカー1つあたりの出力キュー容量
    fn capacity_per_worker(&self) -> usize;

    /// 出力キューを無制限にするかどうか
    fn unbounded_queues(&self) -> bool;

    /// ワーカー数を指定しなかった場合の既定値
    fn default_workers(&self) -> usize;
}

/// ステージの進行状況を報告するトレイト
///
/// 例外ハンドラ無しで失敗したワーカーは黙って終了するため、
/// その件数はこのトレイト経由でのみ観測できる
#[automock]
#[async_trait]
pub trait PipelineReporter: Send + Sync {
    /// ステージ起動時の報告
    async fn report_stage_started(&self, stage: &str, n_workers: usize);

    /// ワーカーが未処理のエラーで終了したときの報告
    async fn report_worker_failed(&self, stage: &str, worker_id: usize, error: &str);

    /// 出力キューを閉じたときの報告（ステージごとに一度だけ）
    async fn report_stage_closed(&self, summary: &StageSummary);
}
