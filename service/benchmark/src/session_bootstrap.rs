use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use domain_benchmark::{
    exception::CloudPerfException,
    model::{entity::AcquiredInstance, vo::InstanceState},
    service::{ComputeProvider, RemoteSession, SessionBootstrapService, SessionConnector},
};
use indoc::indoc;
use tokio::time::Instant;

/// Quiets background services and installs docker-compose.
pub const DEFAULT_BOOTSTRAP_SCRIPT: &str = indoc! {r#"
    #!/bin/sh
    sudo systemctl stop acpid chronyd crond ecs postfix
    sudo curl -L "https://github.com/docker/compose/releases/download/1.23.2/docker-compose-$(uname -s)-$(uname -m)" -o /usr/local/bin/docker-compose
    sudo chmod +x /usr/local/bin/docker-compose
"#};

const BOOTSTRAP_PATH: &str = "init_script";

#[derive(typed_builder::TypedBuilder)]
pub struct SessionBootstrapServiceImpl {
    provider: Arc<dyn ComputeProvider>,
    connector: Arc<dyn SessionConnector>,
    #[builder(default = Duration::from_secs(15))]
    poll_interval: Duration,
    #[builder(default = 120)]
    poll_attempts: u32,
    #[builder(default = Duration::from_secs(5))]
    pre_connect_delay: Duration,
    #[builder(default = Duration::from_secs(5))]
    connect_retry_interval: Duration,
    #[builder(default = Duration::from_secs(30 * 60))]
    connect_timeout: Duration,
    #[builder(default = DEFAULT_BOOTSTRAP_SCRIPT.to_string(), setter(into))]
    bootstrap_script: String,
    #[builder(default = 4)]
    bootstrap_attempts: u32,
    #[builder(default = Duration::from_secs(5))]
    bootstrap_retry_interval: Duration,
    #[builder(default = Duration::from_secs(600))]
    exec_timeout: Duration,
    /// Lets the machine calm down after bootstrapping.
    #[builder(default = Duration::from_secs(20))]
    settle_time: Duration,
}

#[async_trait]
impl SessionBootstrapService for SessionBootstrapServiceImpl {
    async fn open(&self, instance: &AcquiredInstance) -> anyhow::Result<Arc<dyn RemoteSession>> {
        let address = self
            .wait_until_running(instance)
            .await?
            .or_else(|| instance.private_address.clone())
            .ok_or_else(|| CloudPerfException::NoAddress {
                instance_id: instance.instance_id.clone(),
            })?;
        tokio::time::sleep(self.pre_connect_delay).await;

        let session = self.connect(&address).await?;
        self.bootstrap(instance, session.as_ref()).await?;

        tracing::info!("Bootstrapped {}, settling.", instance.instance_id);
        tokio::time::sleep(self.settle_time).await;
        Ok(session)
    }
}

impl SessionBootstrapServiceImpl {
    /// Polls until the instance runs. Running out of polls is not an error,
    /// the connect loop has its own deadline.
    async fn wait_until_running(
        &self,
        instance: &AcquiredInstance,
    ) -> anyhow::Result<Option<String>> {
        for attempt in 0..self.poll_attempts {
            match self.provider.describe_instance(&instance.instance_id).await {
                Ok(description) if description.state == InstanceState::Running => {
                    tracing::info!("Instance {} is running.", instance.instance_id);
                    return Ok(description.private_address);
                }
                Ok(description) if description.state.is_gone() => {
                    anyhow::bail!(
                        "Instance {} went {:?} before it started running.",
                        instance.instance_id,
                        description.state
                    );
                }
                Ok(description) => tracing::debug!(
                    "Instance {} is {:?}, poll #{attempt}.",
                    instance.instance_id,
                    description.state
                ),
                Err(e) => tracing::warn!(
                    "Couldn't describe instance {}: {e:#}",
                    instance.instance_id
                ),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        tracing::warn!(
            "Instance {} didn't report running after {} polls, trying anyway.",
            instance.instance_id,
            self.poll_attempts
        );
        Ok(None)
    }

    async fn connect(&self, address: &str) -> anyhow::Result<Arc<dyn RemoteSession>> {
        let deadline = Instant::now() + self.connect_timeout;
        loop {
            match self.connector.connect(address).await {
                Ok(session) => return Ok(session),
                Err(e) => {
                    let now = Instant::now();
                    if now + self.connect_retry_interval >= deadline {
                        return Err(CloudPerfException::SessionTimeout {
                            address: address.to_string(),
                            seconds: self.connect_timeout.as_secs(),
                        }
                        .into());
                    }
                    tracing::info!(
                        "Waiting for {address}, {}s left: {e:#}",
                        (deadline - now).as_secs()
                    );
                    tokio::time::sleep(self.connect_retry_interval).await;
                }
            }
        }
    }

    async fn bootstrap(
        &self,
        instance: &AcquiredInstance,
        session: &dyn RemoteSession,
    ) -> anyhow::Result<()> {
        let mut written = false;
        let mut last_output = String::new();
        for attempt in 0..self.bootstrap_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.bootstrap_retry_interval).await;
            }
            if !written {
                match session
                    .write_file(BOOTSTRAP_PATH, &self.bootstrap_script, 0o755)
                    .await
                {
                    Ok(()) => written = true,
                    Err(e) => {
                        tracing::warn!("Couldn't upload bootstrap script, try #{attempt}: {e:#}");
                        last_output = format!("{e:#}");
                        continue;
                    }
                }
            }
            match session
                .exec(&format!("./{BOOTSTRAP_PATH}"), self.exec_timeout)
                .await
            {
                Ok(output) if output.success() => return Ok(()),
                Ok(output) => {
                    tracing::warn!(
                        "Bootstrap script exited with {:?}, try #{attempt}: {}",
                        output.exit_status,
                        output.stderr
                    );
                    last_output = output.stderr;
                }
                Err(e) => {
                    tracing::warn!("Couldn't run bootstrap script, try #{attempt}: {e:#}");
                    last_output = format!("{e:#}");
                }
            }
        }
        Err(CloudPerfException::BootstrapFailed {
            instance_id: instance.instance_id.clone(),
            attempts: self.bootstrap_attempts,
            output: last_output,
        }
        .into())
    }
}
