use crate::model::vo::{BenchmarkTask, FleetReport};

#[async_trait::async_trait]
pub trait FleetService: Send + Sync {
    /// Benchmark every task on its own instance over a bounded worker pool.
    async fn run(&self, tasks: Vec<BenchmarkTask>) -> FleetReport;

    /// Terminate every running instance tagged as ours, returns their ids.
    async fn sweep(&self) -> anyhow::Result<Vec<String>>;
}
