use std::sync::Arc;

use crate::model::entity::{BenchmarkDefinition, BenchmarkResult};
use crate::model::vo::BenchmarkTarget;
use crate::service::RemoteSession;

#[async_trait::async_trait]
pub trait BenchmarkRunnerService: Send + Sync {
    /// Run `definitions` in order and return one row per benchmark and CPU
    /// count. Failures stop the sequence but keep the rows collected so far.
    async fn run(
        &self,
        session: Arc<dyn RemoteSession>,
        target: &BenchmarkTarget,
        definitions: &[BenchmarkDefinition],
    ) -> Vec<BenchmarkResult>;
}
