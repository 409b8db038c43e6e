use chrono::NaiveDate;
use domain_benchmark::model::vo::{BlacklistEntry, ExpiryWindow, Tag};
use getset::Getters;
use serde::*;

use super::telemetry::TelemetryConfig;

#[derive(Default, Deserialize, Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct CommonConfig {
    #[serde(default)]
    telemetry: TelemetryConfig,
}

#[derive(Deserialize, Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct CloudPerfConfig {
    #[serde(default = "CloudPerfConfig::default_provider")]
    provider: String,
    #[serde(default = "CloudPerfConfig::default_region")]
    region: String,
    /// Width of the worker pool.
    #[serde(default = "CloudPerfConfig::default_workers")]
    workers: usize,
    /// How long a benchmark row stays fresh, e.g. `12w` or `3d`.
    #[serde(default)]
    expire: ExpiryWindow,
    /// Extra tags put on every instance.
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default = "CloudPerfConfig::default_blacklist")]
    blacklist: Vec<BlacklistEntry>,
    /// YAML file with the benchmark catalog, the built-in catalog when unset.
    #[serde(default)]
    catalog: Option<String>,
    #[serde(default)]
    ssh: SshConfig,
    #[serde(default)]
    launch: LaunchConfig,
    #[serde(default)]
    timeouts: TimeoutConfig,
}

impl Default for CloudPerfConfig {
    fn default() -> Self {
        Self {
            provider: Self::default_provider(),
            region: Self::default_region(),
            workers: Self::default_workers(),
            expire: Default::default(),
            tags: Default::default(),
            blacklist: Self::default_blacklist(),
            catalog: Default::default(),
            ssh: Default::default(),
            launch: Default::default(),
            timeouts: Default::default(),
        }
    }
}

impl CloudPerfConfig {
    /// Read the `cloudperf` section. Only a missing section falls back to the
    /// defaults, a malformed one is an error.
    pub fn load(config: &config::Config) -> anyhow::Result<Self> {
        match config.get::<Self>("cloudperf") {
            Ok(x) => Ok(x),
            Err(config::ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(anyhow::Error::new(e).context("Invalid `cloudperf` configuration")),
        }
    }

    fn default_provider() -> String {
        "aws".to_string()
    }
    fn default_region() -> String {
        "us-east-1".to_string()
    }
    fn default_workers() -> usize {
        4
    }
    fn default_blacklist() -> Vec<BlacklistEntry> {
        let entry = |prefix: &str, y, m, d| BlacklistEntry {
            prefix: prefix.to_string(),
            until: NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MAX),
        };
        vec![
            entry("c6g", 2020, 4, 1),
            entry("m6g", 2020, 2, 1),
            entry("r6g", 2020, 4, 1),
            entry("cc2.8xlarge", 9999, 1, 1),
        ]
    }
}

#[derive(Deserialize, Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct SshConfig {
    #[serde(default = "SshConfig::default_user")]
    user: String,
    /// Private key matching `launch.key_name`, the ssh agent's keys otherwise.
    #[serde(default)]
    key_file: Option<String>,
    #[serde(default = "SshConfig::default_port")]
    port: u16,
    /// Seconds one connection attempt may take.
    #[serde(default = "SshConfig::default_connect_timeout")]
    connect_timeout: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: Self::default_user(),
            key_file: Default::default(),
            port: Self::default_port(),
            connect_timeout: Self::default_connect_timeout(),
        }
    }
}

impl SshConfig {
    fn default_user() -> String {
        "ec2-user".to_string()
    }
    fn default_port() -> u16 {
        22
    }
    fn default_connect_timeout() -> u64 {
        10
    }
}

#[derive(Deserialize, Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct LaunchConfig {
    #[serde(default = "LaunchConfig::default_key_name")]
    key_name: String,
    #[serde(default = "LaunchConfig::default_security_groups")]
    security_groups: Vec<String>,
    #[serde(default = "LaunchConfig::default_user_data")]
    user_data: String,
    /// Name pattern of the machine images to launch.
    #[serde(default = "LaunchConfig::default_image_name")]
    image_name: String,
    #[serde(default = "LaunchConfig::default_retry_budget")]
    retry_budget: u32,
    /// Replaces the built-in bootstrap script when set.
    #[serde(default)]
    bootstrap_script: Option<String>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            key_name: Self::default_key_name(),
            security_groups: Self::default_security_groups(),
            user_data: Self::default_user_data(),
            image_name: Self::default_image_name(),
            retry_budget: Self::default_retry_budget(),
            bootstrap_script: Default::default(),
        }
    }
}

impl LaunchConfig {
    fn default_key_name() -> String {
        "batch".to_string()
    }
    fn default_security_groups() -> Vec<String> {
        vec!["tech-ssh".to_string()]
    }
    fn default_user_data() -> String {
        "#!/bin/sh\nshutdown +120".to_string()
    }
    fn default_image_name() -> String {
        "amzn2-ami-ecs-hvm*ebs".to_string()
    }
    fn default_retry_budget() -> u32 {
        16
    }
}

/// All values in seconds.
#[derive(Deserialize, Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct TimeoutConfig {
    /// Default limit of one remote command.
    #[serde(default = "TimeoutConfig::default_exec")]
    exec: u64,
    /// How long to keep trying to reach a new instance.
    #[serde(default = "TimeoutConfig::default_connect")]
    connect: u64,
    /// Limit of one provider API call.
    #[serde(default = "TimeoutConfig::default_provider")]
    provider: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            exec: Self::default_exec(),
            connect: Self::default_connect(),
            provider: Self::default_provider(),
        }
    }
}

impl TimeoutConfig {
    fn default_exec() -> u64 {
        600
    }
    fn default_connect() -> u64 {
        30 * 60
    }
    fn default_provider() -> u64 {
        120
    }
}

/// Layer the optional `config.yaml`, then `extra`, then `CLOUDPERF__*` variables.
pub fn build_config(extra: Option<&str>) -> anyhow::Result<config::Config> {
    let mut config = config::Config::builder().add_source(
        config::File::with_name("config")
            .required(false)
            .format(config::FileFormat::Yaml),
    );
    if let Some(path) = extra {
        config = config.add_source(
            config::File::from(std::path::Path::new(path)).format(config::FileFormat::Yaml),
        );
    }
    config = config.add_source(
        config::Environment::with_prefix("CLOUDPERF")
            .separator("__")
            .try_parsing(true)
            .list_separator(";")
            .with_list_parse_key("cloudperf.launch.security_groups"),
    );
    Ok(config.build()?)
}
