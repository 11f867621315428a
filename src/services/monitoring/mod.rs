// ステージ監視機能
// ステージ起動、ワーカー失敗、出力キュー閉鎖の報告

pub mod implementations;

// 公開API
pub use implementations::{ConsoleReporter, MemoryReporter, NoOpReporter, ReportEvent};
