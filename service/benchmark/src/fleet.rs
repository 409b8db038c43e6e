use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::DashMap;
use domain_benchmark::{
    model::{
        entity::BenchmarkResult,
        vo::{
            AcquisitionOutcome, AcquisitionRequest, Architecture, BenchmarkTarget, BenchmarkTask,
            FleetReport, SkipReason, Tag,
        },
    },
    service::{
        BenchmarkRunnerService, ComputeProvider, FleetService, InstanceAcquisitionService,
        SessionBootstrapService,
    },
};
use tokio::sync::Semaphore;
use tracing::Instrument;

#[derive(typed_builder::TypedBuilder)]
pub struct FleetServiceImpl {
    provider: Arc<dyn ComputeProvider>,
    acquisition: Arc<dyn InstanceAcquisitionService>,
    bootstrap: Arc<dyn SessionBootstrapService>,
    runner: Arc<dyn BenchmarkRunnerService>,
    #[builder(default = 4)]
    workers: usize,
    /// Caller tags put on every instance.
    #[builder(default)]
    tags: Vec<Tag>,
    #[builder(default = crate::application_tag())]
    application_tag: Tag,
    #[builder(default = 3)]
    terminate_attempts: u32,
    #[builder(default = Duration::from_secs(5))]
    terminate_retry_interval: Duration,
    #[builder(default)]
    images: Arc<DashMap<Architecture, String>>,
}

/// What one worker hands back.
struct TaskOutcome {
    results: Vec<BenchmarkResult>,
    skipped: Option<SkipReason>,
    fatal: bool,
}

impl TaskOutcome {
    fn finished(results: Vec<BenchmarkResult>) -> Self {
        Self {
            results,
            skipped: None,
            fatal: false,
        }
    }

    fn skipped(reason: SkipReason) -> Self {
        Self {
            results: vec![],
            skipped: Some(reason),
            fatal: false,
        }
    }
}

/// The shared parts of the service a worker needs, cheap to clone into a task.
#[derive(Clone)]
struct Worker {
    provider: Arc<dyn ComputeProvider>,
    acquisition: Arc<dyn InstanceAcquisitionService>,
    bootstrap: Arc<dyn SessionBootstrapService>,
    runner: Arc<dyn BenchmarkRunnerService>,
    tags: Vec<Tag>,
    terminate_attempts: u32,
    terminate_retry_interval: Duration,
    images: Arc<DashMap<Architecture, String>>,
}

#[async_trait]
impl FleetService for FleetServiceImpl {
    async fn run(&self, tasks: Vec<BenchmarkTask>) -> FleetReport {
        let semaphore = Arc::new(Semaphore::new(self.workers.max(1)));
        let mut handles = vec![];
        for task in tasks {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    tracing::error!("Worker pool closed: {e}");
                    break;
                }
            };
            let instance_type = task.offer.instance_type.clone();
            let span = tracing::info_span!("worker", instance_type = %instance_type);
            let worker = self.worker();
            let handle = tokio::spawn(
                async move {
                    let outcome = worker.run_task(task).await;
                    drop(permit);
                    outcome
                }
                .instrument(span),
            );
            handles.push((instance_type, handle));
        }

        let mut report = FleetReport::default();
        for (instance_type, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!("Worker for {instance_type} crashed: {e}");
                    TaskOutcome::skipped(SkipReason::Crashed)
                }
            };
            report.results.extend(outcome.results);
            if let Some(reason) = outcome.skipped {
                report.skipped.push((instance_type, reason));
            }
            report.fatal |= outcome.fatal;
        }
        tracing::info!(
            "Fleet finished with {} rows, {} instance types skipped.",
            report.results.len(),
            report.skipped.len()
        );
        report
    }

    async fn sweep(&self) -> anyhow::Result<Vec<String>> {
        let instances = self
            .provider
            .list_tagged_instances(&self.application_tag)
            .await?;
        let mut terminated = vec![];
        for instance in instances {
            if !instance.tags.contains(&self.application_tag) {
                tracing::warn!(
                    "Instance {} came back without our tag, leaving it alone.",
                    instance.instance_id
                );
                continue;
            }
            tracing::info!("Terminating leftover instance {}.", instance.instance_id);
            match self.provider.terminate_instance(&instance.instance_id).await {
                Ok(()) => terminated.push(instance.instance_id),
                Err(e) => tracing::error!(
                    "Couldn't terminate instance {}: {e:#}",
                    instance.instance_id
                ),
            }
        }
        Ok(terminated)
    }
}

impl FleetServiceImpl {
    fn worker(&self) -> Worker {
        Worker {
            provider: self.provider.clone(),
            acquisition: self.acquisition.clone(),
            bootstrap: self.bootstrap.clone(),
            runner: self.runner.clone(),
            tags: self.tags.clone(),
            terminate_attempts: self.terminate_attempts,
            terminate_retry_interval: self.terminate_retry_interval,
            images: self.images.clone(),
        }
    }
}

impl Worker {
    async fn run_task(self, task: BenchmarkTask) -> TaskOutcome {
        let target = BenchmarkTarget::from(&task.offer);
        let image_id = match self.image_for(target.architecture).await {
            Ok(image_id) => image_id,
            Err(e) => {
                tracing::error!("No machine image for {}: {e:#}", target.architecture);
                return TaskOutcome::skipped(SkipReason::NoImage);
            }
        };
        let request = AcquisitionRequest {
            instance_type: target.instance_type.clone(),
            architecture: target.architecture,
            image_id,
            max_spot_price: task.offer.price,
            tags: self.tags.clone(),
        };
        let instance = match self.acquisition.acquire(&request).await {
            AcquisitionOutcome::Acquired(instance) => instance,
            AcquisitionOutcome::Abandoned { category, fatal } => {
                tracing::warn!(
                    "Skipping {}, acquisition abandoned: {category:?}",
                    target.instance_type
                );
                return TaskOutcome {
                    fatal,
                    ..TaskOutcome::skipped(SkipReason::NotAcquired)
                };
            }
            AcquisitionOutcome::Exhausted { attempts } => {
                tracing::warn!(
                    "Skipping {}, not acquired after {attempts} attempts.",
                    target.instance_type
                );
                return TaskOutcome::skipped(SkipReason::NotAcquired);
            }
        };

        // The inner work runs in its own task so a panic there still reaches
        // the termination below.
        let span = tracing::info_span!("instance", instance_id = %instance.instance_id);
        let inner = {
            let bootstrap = self.bootstrap.clone();
            let runner = self.runner.clone();
            let instance = instance.clone();
            tokio::spawn(
                async move {
                    let session = match bootstrap.open(&instance).await {
                        Ok(session) => session,
                        Err(e) => {
                            tracing::error!("Couldn't open a session, terminating: {e:#}");
                            return Err(SkipReason::NoSession);
                        }
                    };
                    Ok(runner.run(session, &target, &task.benchmarks).await)
                }
                .instrument(span),
            )
        };
        let outcome = match inner.await {
            Ok(Ok(results)) => TaskOutcome::finished(results),
            Ok(Err(reason)) => TaskOutcome::skipped(reason),
            Err(e) => {
                tracing::error!("Benchmarking on {} crashed: {e}", instance.instance_id);
                TaskOutcome::skipped(SkipReason::Crashed)
            }
        };

        self.terminate(&instance.instance_id).await;
        outcome
    }

    async fn image_for(&self, architecture: Architecture) -> anyhow::Result<String> {
        if let Some(image) = self.images.get(&architecture).map(|i| i.value().clone()) {
            return Ok(image);
        }
        let image = self.provider.latest_image(architecture).await?;
        tracing::info!("Using machine image {image} for {architecture}.");
        self.images.insert(architecture, image.clone());
        Ok(image)
    }

    async fn terminate(&self, instance_id: &str) {
        for attempt in 0..self.terminate_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.terminate_retry_interval).await;
            }
            match self.provider.terminate_instance(instance_id).await {
                Ok(()) => {
                    tracing::info!("Terminated instance {instance_id}.");
                    return;
                }
                Err(e) => tracing::warn!(
                    "Couldn't terminate instance {instance_id}, try #{attempt}: {e:#}"
                ),
            }
        }
        tracing::error!("Giving up terminating instance {instance_id}, it shuts itself down later.");
    }
}
