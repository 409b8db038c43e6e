use crate::model::vo::{
    Architecture, InstanceDescription, LaunchError, LaunchSpec, LaunchedInstance, Tag,
};

/// The remote compute provider's API.
#[async_trait::async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Newest machine image suitable for benchmarking on `architecture`.
    async fn latest_image(&self, architecture: Architecture) -> anyhow::Result<String>;

    async fn run_instance(&self, spec: &LaunchSpec) -> Result<LaunchedInstance, LaunchError>;

    async fn describe_instance(&self, instance_id: &str) -> anyhow::Result<InstanceDescription>;

    async fn terminate_instance(&self, instance_id: &str) -> anyhow::Result<()>;

    /// Running instances carrying `tag`.
    async fn list_tagged_instances(&self, tag: &Tag) -> anyhow::Result<Vec<InstanceDescription>>;
}
