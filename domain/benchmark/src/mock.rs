use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;

use crate::{
    model::{
        entity::{AcquiredInstance, BenchmarkDefinition, BenchmarkResult},
        vo::{
            AcquisitionOutcome, AcquisitionRequest, Architecture, BenchmarkTarget, CommandOutput,
            InstanceDescription, LaunchError, LaunchSpec, LaunchedInstance, Tag,
        },
    },
    service::{
        BenchmarkRunnerService, ComputeProvider, InstanceAcquisitionService, RemoteSession,
        SessionBootstrapService, SessionConnector,
    },
};

mock! {
    pub ComputeProvider {}
    #[async_trait]
    impl ComputeProvider for ComputeProvider {
        async fn latest_image(&self, architecture: Architecture) -> anyhow::Result<String>;
        async fn run_instance(&self, spec: &LaunchSpec) -> Result<LaunchedInstance, LaunchError>;
        async fn describe_instance(&self, instance_id: &str) -> anyhow::Result<InstanceDescription>;
        async fn terminate_instance(&self, instance_id: &str) -> anyhow::Result<()>;
        async fn list_tagged_instances(&self, tag: &Tag) -> anyhow::Result<Vec<InstanceDescription>>;
    }
}

mock! {
    pub RemoteSession {}
    #[async_trait]
    impl RemoteSession for RemoteSession {
        async fn exec(&self, command: &str, timeout: Duration) -> anyhow::Result<CommandOutput>;
        async fn write_file(&self, path: &str, contents: &str, mode: u32) -> anyhow::Result<()>;
    }
}

mock! {
    pub SessionConnector {}
    #[async_trait]
    impl SessionConnector for SessionConnector {
        async fn connect(&self, address: &str) -> anyhow::Result<Arc<dyn RemoteSession>>;
    }
}

mock! {
    pub InstanceAcquisitionService {}
    #[async_trait]
    impl InstanceAcquisitionService for InstanceAcquisitionService {
        async fn acquire(&self, request: &AcquisitionRequest) -> AcquisitionOutcome;
    }
}

mock! {
    pub SessionBootstrapService {}
    #[async_trait]
    impl SessionBootstrapService for SessionBootstrapService {
        async fn open(&self, instance: &AcquiredInstance) -> anyhow::Result<Arc<dyn RemoteSession>>;
    }
}

mock! {
    pub BenchmarkRunnerService {}
    #[async_trait]
    impl BenchmarkRunnerService for BenchmarkRunnerService {
        async fn run(
            &self,
            session: Arc<dyn RemoteSession>,
            target: &BenchmarkTarget,
            definitions: &[BenchmarkDefinition],
        ) -> Vec<BenchmarkResult>;
    }
}
