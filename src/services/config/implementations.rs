// 設定管理の具象実装

use crate::core::error::{PipelineError, PipelineResult};
use crate::core::PipelineConfig;

/// デフォルト設定実装
#[derive(Debug, Clone)]
pub struct DefaultPipelineConfig {
    capacity_per_worker: usize,
    unbounded: bool,
    default_workers: usize,
}

impl DefaultPipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// CPU数に合わせた既定ワーカー数を持つ設定
    pub fn for_cpus() -> Self {
        Self::default().with_default_workers(num_cpus::get().max(1))
    }

    pub fn with_capacity_per_worker(mut self, capacity_per_worker: usize) -> Self {
        self.capacity_per_worker = capacity_per_worker;
        self
    }

    pub fn with_unbounded_queues(mut self, unbounded: bool) -> Self {
        self.unbounded = unbounded;
        self
    }

    pub fn with_default_workers(mut self, default_workers: usize) -> Self {
        self.default_workers = default_workers;
        self
    }

    /// 設定値の検証
    pub fn validate(&self) -> PipelineResult<()> {
        if self.default_workers == 0 {
            return Err(PipelineError::configuration(
                "既定ワーカー数は1以上である必要があります",
            ));
        }
        if !self.unbounded && self.capacity_per_worker == 0 {
            return Err(PipelineError::configuration(
                "ワーカーあたりのキュー容量は1以上である必要があります",
            ));
        }
        Ok(())
    }
}

impl Default for DefaultPipelineConfig {
    fn default() -> Self {
        Self {
            // 出力キューは既定で 2 * n_workers
            capacity_per_worker: 2,
            unbounded: false,
            default_workers: 1,
        }
    }
}

impl PipelineConfig for DefaultPipelineConfig {
    fn capacity_per_worker(&self) -> usize {
        self.capacity_per_worker
    }

    fn unbounded_queues(&self) -> bool {
        self.unbounded
    }

    fn default_workers(&self) -> usize {
        self.default_workers
    }
}
