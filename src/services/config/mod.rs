// 設定管理
// パイプライン全体に適用されるキュー容量と既定ワーカー数

pub mod implementations;

// 公開API
pub use implementations::DefaultPipelineConfig;
