use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use domain_benchmark::{
    exception::CloudPerfException,
    model::{
        entity::{BenchmarkDefinition, BenchmarkResult, ServiceTopology},
        vo::BenchmarkTarget,
    },
    service::{BenchmarkRunnerService, RemoteSession},
};

use crate::command::CommandTemplate;

const COMPOSE_FILE: &str = "docker-compose.yml";
const AFTER_UP_SCRIPT: &str = "after_compose_up";
const AFTER_DOWN_SCRIPT: &str = "after_compose_down";

#[derive(typed_builder::TypedBuilder)]
pub struct BenchmarkRunnerServiceImpl {
    #[builder(default = Duration::from_secs(600))]
    exec_timeout: Duration,
    #[builder(default = 4)]
    pull_attempts: u32,
    #[builder(default = Duration::from_secs(5))]
    pull_retry_interval: Duration,
    /// Slack on top of a definition's kill deadline before the session gives up.
    #[builder(default = Duration::from_secs(10))]
    timeout_margin: Duration,
}

#[async_trait]
impl BenchmarkRunnerService for BenchmarkRunnerServiceImpl {
    async fn run(
        &self,
        session: Arc<dyn RemoteSession>,
        target: &BenchmarkTarget,
        definitions: &[BenchmarkDefinition],
    ) -> Vec<BenchmarkResult> {
        let mut results = vec![];
        for definition in definitions {
            tracing::info!(
                "Running benchmark {} on {}.",
                definition.id,
                target.instance_type
            );
            if let Err(e) = self
                .run_definition(session.as_ref(), target, definition, &mut results)
                .await
            {
                tracing::error!(
                    "Error while executing benchmark {} on {}: {e:#}",
                    definition.id,
                    target.instance_type
                );
                break;
            }
        }
        results
    }
}

impl BenchmarkRunnerServiceImpl {
    /// Skippable problems are logged and return `Ok`, `Err` stops the sequence.
    async fn run_definition(
        &self,
        session: &dyn RemoteSession,
        target: &BenchmarkTarget,
        definition: &BenchmarkDefinition,
        results: &mut Vec<BenchmarkResult>,
    ) -> anyhow::Result<()> {
        let Some(image) = definition.image_for(target.architecture) else {
            tracing::error!(
                "{}",
                CloudPerfException::NoImage {
                    benchmark_id: definition.id.clone(),
                    architecture: target.architecture.to_string(),
                }
            );
            return Ok(());
        };
        let template = match CommandTemplate::new(&definition.id, &definition.cmd) {
            Ok(template) => template,
            Err(e) => {
                tracing::error!("{e}");
                return Ok(());
            }
        };

        for (path, contents) in &definition.files {
            session.write_file(path, contents, 0o755).await?;
        }
        if !self.pull_image(session, image).await? {
            tracing::error!("Couldn't pull {image}, skipping {}.", definition.id);
            return Ok(());
        }
        if let Some(topology) = &definition.compose {
            if !self.compose_up(session, topology).await? {
                tracing::error!("Couldn't start services of {}, skipping.", definition.id);
                return Ok(());
            }
        }

        let swept = self
            .sweep(session, target, definition, image, &template, results)
            .await;
        if let Some(topology) = &definition.compose {
            self.compose_down(session, topology).await?;
        }
        swept
    }

    async fn sweep(
        &self,
        session: &dyn RemoteSession,
        target: &BenchmarkTarget,
        definition: &BenchmarkDefinition,
        image: &str,
        template: &CommandTemplate<'_>,
        results: &mut Vec<BenchmarkResult>,
    ) -> anyhow::Result<()> {
        let timeout = self.run_timeout(definition);
        for cpu_count in definition.cpu_sweep(target.vcpu_count) {
            let rendered = match template.render(cpu_count) {
                Ok(rendered) => rendered,
                Err(e) => {
                    tracing::error!("{e}");
                    return Ok(());
                }
            };
            session.exec("sync", self.exec_timeout).await?;
            let command = format!(
                "{}docker run --rm {} {} {}",
                definition.timeout_prefix(),
                definition.docker_opts,
                image,
                rendered
            );

            let mut scores = Vec::with_capacity(definition.iterations as usize);
            for iteration in 0..definition.iterations {
                tracing::info!("Running `{command}`, iteration #{iteration}.");
                let output = session.exec(&command, timeout).await?;
                if !output.success() {
                    tracing::info!(
                        "Benchmark {} exited with {:?}{}: {}",
                        definition.id,
                        output.exit_status,
                        if output.timed_out { " after timing out" } else { "" },
                        output.stderr.trim()
                    );
                    continue;
                }
                match output.stdout.trim().parse::<f64>() {
                    Ok(score) => scores.push(Some(score)),
                    Err(_) => {
                        tracing::info!(
                            "Couldn't parse output of {}: {:?}",
                            definition.id,
                            output.stdout
                        );
                        scores.push(None);
                    }
                }
            }

            let score = definition.score_aggregation.aggregate(&scores);
            tracing::info!(
                "{} on {} with {cpu_count} CPUs scored {score:?}.",
                definition.id,
                target.instance_type
            );
            results.push(BenchmarkResult {
                provider: target.provider.clone(),
                instance_type: target.instance_type.clone(),
                benchmark_id: definition.id.clone(),
                benchmark_name: Some(definition.name.clone()),
                program: definition.program.clone(),
                cpu_count,
                score,
                command,
                observed_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn pull_image(&self, session: &dyn RemoteSession, image: &str) -> anyhow::Result<bool> {
        for attempt in 0..self.pull_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.pull_retry_interval).await;
            }
            tracing::info!("Docker pull {image}, try #{attempt}.");
            let output = session
                .exec(&format!("docker pull {image}; sync; sleep 10"), self.exec_timeout)
                .await?;
            if output.success() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn compose_up(
        &self,
        session: &dyn RemoteSession,
        topology: &ServiceTopology,
    ) -> anyhow::Result<bool> {
        session
            .write_file(COMPOSE_FILE, &topology.compose_file, 0o644)
            .await?;
        let output = session.exec("docker-compose up -d", self.exec_timeout).await?;
        if !output.success() {
            tracing::error!("docker-compose up failed: {}", output.stderr.trim());
            return Ok(false);
        }
        if let Some(script) = &topology.after_up {
            if !self.run_script(session, AFTER_UP_SCRIPT, script).await? {
                self.compose_down(session, topology).await?;
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn compose_down(
        &self,
        session: &dyn RemoteSession,
        topology: &ServiceTopology,
    ) -> anyhow::Result<()> {
        let output = session
            .exec("docker-compose down -v", self.exec_timeout)
            .await?;
        if !output.success() {
            tracing::warn!("docker-compose down failed: {}", output.stderr.trim());
        }
        if let Some(script) = &topology.after_down {
            self.run_script(session, AFTER_DOWN_SCRIPT, script).await?;
        }
        Ok(())
    }

    async fn run_script(
        &self,
        session: &dyn RemoteSession,
        path: &str,
        script: &str,
    ) -> anyhow::Result<bool> {
        session.write_file(path, script, 0o755).await?;
        let output = session
            .exec(&format!("./{path}"), self.exec_timeout)
            .await?;
        if !output.success() {
            tracing::error!("{path} failed: {}", output.stderr.trim());
        }
        Ok(output.success())
    }

    fn run_timeout(&self, definition: &BenchmarkDefinition) -> Duration {
        match definition.timeout {
            Some(timeout) => self
                .exec_timeout
                .max(Duration::from_secs(timeout + 5) + self.timeout_margin),
            None => self.exec_timeout,
        }
    }
}
