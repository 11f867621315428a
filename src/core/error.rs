// Custom error types for the stage pipeline
// パイプライン専用のカスタムエラー型定義

use thiserror::Error;

/// パイプライン固有のエラー型
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("キュー閉鎖エラー: 閉じられたキューへputしようとしました")]
    QueueClosed,

    #[error("ワーカー変換エラー: {stage} (worker {worker_id}) - {source}")]
    WorkerTransform {
        stage: String,
        worker_id: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("ワーカーパニック: {stage} (worker {worker_id}) - {message}")]
    WorkerPanicked {
        stage: String,
        worker_id: usize,
        message: String,
    },

    #[error("設定エラー: {message}")]
    Configuration { message: String },

    #[error("タスクエラー: {source}")]
    Task {
        #[source]
        source: tokio::task::JoinError,
    },

    #[error("内部エラー: {source}")]
    Internal {
        #[source]
        source: anyhow::Error,
    },
}

impl PipelineError {
    /// ワーカー変換エラーの作成
    pub fn worker_transform(
        stage: impl Into<String>,
        worker_id: usize,
        source: anyhow::Error,
    ) -> Self {
        Self::WorkerTransform {
            stage: stage.into(),
            worker_id,
            source,
        }
    }

    /// ワーカーパニックの作成
    pub fn worker_panicked(
        stage: impl Into<String>,
        worker_id: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::WorkerPanicked {
            stage: stage.into(),
            worker_id,
            message: message.into(),
        }
    }

    /// 設定エラーの作成
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// タスクエラーの作成
    pub fn task(source: tokio::task::JoinError) -> Self {
        Self::Task { source }
    }

    /// 内部エラーの作成
    pub fn internal(source: anyhow::Error) -> Self {
        Self::Internal { source }
    }

    /// エラーの重要度を取得
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Configuration { .. } => ErrorSeverity::High,
            Self::QueueClosed => ErrorSeverity::Medium,
            Self::WorkerTransform { .. } => ErrorSeverity::Medium,
            Self::WorkerPanicked { .. } | Self::Task { .. } => ErrorSeverity::High,
            Self::Internal { .. } => ErrorSeverity::Critical,
        }
    }

    /// エラーが回復可能かどうかを判定
    ///
    /// ワーカー単位の失敗はそのワーカーだけを止め、ステージ全体は完了まで進む
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Configuration { .. } | Self::Internal { .. } => false,
            Self::QueueClosed => true,
            Self::WorkerTransform { .. } => true,
            Self::WorkerPanicked { .. } => true,
            Self::Task { .. } => true,
        }
    }
}

/// エラーの重要度レベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// 低重要度 - ログ出力程度
    Low,
    /// 中重要度 - 警告レベル
    Medium,
    /// 高重要度 - 要対応
    High,
    /// 致命的 - システム停止レベル
    Critical,
}

impl ErrorSeverity {
    /// 重要度の文字列表現を取得
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

/// 閉じられたキューへのput失敗
///
/// 受け付けられなかったアイテムを呼び出し元へ返す
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("キューは既に閉じられています")]
pub struct QueueClosed<T>(pub T);

impl<T> QueueClosed<T> {
    /// 受け付けられなかったアイテムを取り出す
    pub fn into_inner(self) -> T {
        self.0
    }
}

/// ノンブロッキングputの失敗理由
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TryPutError<T> {
    #[error("キューが満杯です")]
    Full(T),

    #[error("キューは既に閉じられています")]
    Closed(T),
}

impl<T> TryPutError<T> {
    /// 受け付けられなかったアイテムを取り出す
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Closed(item) => item,
        }
    }
}

/// パイプライン処理の結果型
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

impl<T> From<QueueClosed<T>> for PipelineError {
    fn from(_: QueueClosed<T>) -> Self {
        PipelineError::QueueClosed
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(error: anyhow::Error) -> Self {
        PipelineError::Internal { source: error }
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(error: tokio::task::JoinError) -> Self {
        PipelineError::Task { source: error }
    }
}
