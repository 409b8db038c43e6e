use std::sync::Arc;

use crate::model::entity::AcquiredInstance;
use crate::service::RemoteSession;

#[async_trait::async_trait]
pub trait SessionBootstrapService: Send + Sync {
    /// Wait for the instance, connect and prepare it for benchmarking.
    /// The caller stays responsible for terminating the instance.
    async fn open(&self, instance: &AcquiredInstance) -> anyhow::Result<Arc<dyn RemoteSession>>;
}
