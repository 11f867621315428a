// キュー層 - ステージ間をつなぐ閉鎖可能なチャンネル

pub mod closable;

// 公開API
pub use closable::ClosableQueue;
