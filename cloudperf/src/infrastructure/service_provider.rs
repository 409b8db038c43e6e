use std::{sync::Arc, time::Duration};

use domain_benchmark::{
    model::{
        entity::{BenchmarkDefinition, BenchmarkResult, InstanceOffer},
        vo::Blacklist,
    },
    service::{ComputeProvider, FleetService, SessionConnector},
};
use service_benchmark::*;

use super::{
    catalog::load_catalog,
    config::CloudPerfConfig,
    repository::JsonDatasetRepo,
    service::{AwsCliProvider, SshConnector},
};

/// Everything a command needs, built once from the configuration.
pub struct ServiceProvider {
    config: CloudPerfConfig,
    fleet: Arc<dyn FleetService>,
    catalog: Vec<BenchmarkDefinition>,
    perf_datasets: DatasetMergeService<BenchmarkResult>,
    price_datasets: DatasetMergeService<InstanceOffer>,
}

impl ServiceProvider {
    pub async fn build(config: config::Config) -> anyhow::Result<Self> {
        let cloudperf = CloudPerfConfig::load(&config)?;
        if cloudperf.provider() != "aws" {
            anyhow::bail!("Unsupported provider {}", cloudperf.provider());
        }
        let timeouts = cloudperf.timeouts();
        let launch = cloudperf.launch();
        let ssh = cloudperf.ssh();

        let provider: Arc<dyn ComputeProvider> = Arc::new(
            AwsCliProvider::builder()
                .region(cloudperf.region())
                .image_name(launch.image_name())
                .call_timeout(Duration::from_secs(*timeouts.provider()))
                .build(),
        );
        let connector: Arc<dyn SessionConnector> = Arc::new(
            SshConnector::builder()
                .user(ssh.user())
                .key_file(ssh.key_file().clone())
                .port(*ssh.port())
                .connect_timeout(Duration::from_secs(*ssh.connect_timeout()))
                .build(),
        );
        let acquisition = InstanceAcquisitionServiceImpl::builder()
            .provider(provider.clone())
            .template(
                LaunchTemplate::builder()
                    .key_name(launch.key_name())
                    .security_groups(launch.security_groups().clone())
                    .user_data(launch.user_data())
                    .build(),
            )
            .retry_budget(*launch.retry_budget())
            .build();
        let exec_timeout = Duration::from_secs(*timeouts.exec());
        let bootstrap = SessionBootstrapServiceImpl::builder()
            .provider(provider.clone())
            .connector(connector)
            .connect_timeout(Duration::from_secs(*timeouts.connect()))
            .exec_timeout(exec_timeout);
        let bootstrap = match launch.bootstrap_script() {
            Some(script) => bootstrap.bootstrap_script(script).build(),
            None => bootstrap.build(),
        };
        let runner = BenchmarkRunnerServiceImpl::builder()
            .exec_timeout(exec_timeout)
            .build();
        let fleet = FleetServiceImpl::builder()
            .provider(provider)
            .acquisition(Arc::new(acquisition))
            .bootstrap(Arc::new(bootstrap))
            .runner(Arc::new(runner))
            .workers(*cloudperf.workers())
            .tags(cloudperf.tags().clone())
            .build();

        let catalog = load_catalog(cloudperf.catalog().as_deref()).await?;
        tracing::info!("Loaded {} benchmark definitions.", catalog.len());

        Ok(Self {
            config: cloudperf,
            fleet: Arc::new(fleet),
            catalog,
            perf_datasets: DatasetMergeService::new(Arc::new(
                JsonDatasetRepo::<BenchmarkResult>::default(),
            )),
            price_datasets: DatasetMergeService::new(Arc::new(
                JsonDatasetRepo::<InstanceOffer>::default(),
            )),
        })
    }

    pub fn config(&self) -> &CloudPerfConfig {
        &self.config
    }

    pub fn fleet(&self) -> Arc<dyn FleetService> {
        self.fleet.clone()
    }

    pub fn catalog(&self) -> &[BenchmarkDefinition] {
        &self.catalog
    }

    pub fn blacklist(&self) -> Blacklist {
        Blacklist::new(self.config.blacklist().clone())
    }

    pub fn perf_datasets(&self) -> &DatasetMergeService<BenchmarkResult> {
        &self.perf_datasets
    }

    pub fn price_datasets(&self) -> &DatasetMergeService<InstanceOffer> {
        &self.price_datasets
    }
}
