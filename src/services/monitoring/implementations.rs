// ステージ監視の具象実装

use crate::core::{PipelineReporter, StageSummary};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// コンソール出力による報告実装
#[derive(Debug, Default, Clone)]
pub struct ConsoleReporter {
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quiet() -> Self {
        Self { quiet: true }
    }
}

#[async_trait]
impl PipelineReporter for ConsoleReporter {
    async fn report_stage_started(&self, stage: &str, n_workers: usize) {
        if !self.quiet {
            println!("🚀 Stage {stage} started with {n_workers} worker(s)");
        }
    }

    async fn report_worker_failed(&self, stage: &str, worker_id: usize, error: &str) {
        if !self.quiet {
            eprintln!("❌ Stage {stage} worker {worker_id} stopped: {error}");
        }
    }

    async fn report_stage_closed(&self, summary: &StageSummary) {
        if !self.quiet {
            println!(
                "✅ Stage {} closed. Received: {}, Forwarded: {}, Failures: {}",
                summary.stage, summary.received, summary.forwarded, summary.unhandled_failures
            );
        }
    }
}

/// 何もしない報告実装（テスト・ベンチマーク用）
#[derive(Debug, Default, Clone)]
pub struct NoOpReporter;

impl NoOpReporter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PipelineReporter for NoOpReporter {
    async fn report_stage_started(&self, _stage: &str, _n_workers: usize) {
        // 何もしない
    }

    async fn report_worker_failed(&self, _stage: &str, _worker_id: usize, _error: &str) {
        // 何もしない
    }

    async fn report_stage_closed(&self, _summary: &StageSummary) {
        // 何もしない
    }
}

/// 報告イベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    StageStarted { stage: String, n_workers: usize },
    WorkerFailed { stage: String, worker_id: usize, error: String },
    StageClosed(StageSummary),
}

/// 受け取った報告をメモリに記録する実装
#[derive(Debug, Default, Clone)]
pub struct MemoryReporter {
    events: Arc<Mutex<Vec<ReportEvent>>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 記録済みイベントのスナップショット
    pub fn events(&self) -> Vec<ReportEvent> {
        self.lock().clone()
    }

    /// 指定ステージのclose報告回数
    pub fn closed_count(&self, stage: &str) -> usize {
        self.lock()
            .iter()
            .filter(|event| matches!(event, ReportEvent::StageClosed(s) if s.stage == stage))
            .count()
    }

    /// 指定ステージのワーカー失敗報告
    pub fn failures(&self, stage: &str) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                ReportEvent::WorkerFailed { stage: s, error, .. } if s == stage => {
                    Some(error.clone())
                }
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ReportEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, event: ReportEvent) {
        self.lock().push(event);
    }
}

#[async_trait]
impl PipelineReporter for MemoryReporter {
    async fn report_stage_started(&self, stage: &str, n_workers: usize) {
        self.record(ReportEvent::StageStarted {
            stage: stage.to_string(),
            n_workers,
        });
    }

    async fn report_worker_failed(&self, stage: &str, worker_id: usize, error: &str) {
        self.record(ReportEvent::WorkerFailed {
            stage: stage.to_string(),
            worker_id,
            error: error.to_string(),
        });
    }

    async fn report_stage_closed(&self, summary: &StageSummary) {
        self.record(ReportEvent::StageClosed(summary.clone()));
    }
}
