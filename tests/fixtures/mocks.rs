// mockallの自動生成されたモックを使用

pub use stage_pipeline::core::traits::{MockPipelineConfig, MockPipelineReporter};

/// 固定値を返す設定モック
pub fn config_mock(capacity_per_worker: usize, unbounded: bool, default_workers: usize) -> MockPipelineConfig {
    let mut config = MockPipelineConfig::new();
    config
        .expect_capacity_per_worker()
        .return_const(capacity_per_worker);
    config.expect_unbounded_queues().return_const(unbounded);
    config.expect_default_workers().return_const(default_workers);
    config
}

/// 呼び出しを全て受け入れる報告モック
pub fn permissive_reporter() -> MockPipelineReporter {
    let mut reporter = MockPipelineReporter::new();
    reporter.expect_report_stage_started().return_const(());
    reporter.expect_report_worker_failed().return_const(());
    reporter.expect_report_stage_closed().return_const(());
    reporter
}
