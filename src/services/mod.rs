// サービス層 - 設定と監視の具象実装
// 各サービスは特定の責任を持ち、疎結合で設計されている

pub mod config;
pub mod monitoring;

// 公開API - 各サービスの主要機能を明示的にエクスポート
pub use config::DefaultPipelineConfig;
pub use monitoring::{ConsoleReporter, MemoryReporter, NoOpReporter, ReportEvent};
