use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use domain_benchmark::{
    model::vo::{
        Architecture, InstanceDescription, InstanceState, LaunchError, LaunchSpec,
        LaunchedInstance, MarketOption, ProviderError, Tag,
    },
    service::ComputeProvider,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tokio::process::Command;

static AWS_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"An error occurred \(([^)]+)\) when calling the \w+ operation(?: \([^)]*\))?: (.*)")
        .unwrap()
});

/// Drives the `aws` command line client, which must be installed and have
/// credentials for the configured region.
#[derive(typed_builder::TypedBuilder)]
pub struct AwsCliProvider {
    #[builder(setter(into))]
    region: String,
    #[builder(default = "amzn2-ami-ecs-hvm*ebs".to_string(), setter(into))]
    image_name: String,
    #[builder(default = Duration::from_secs(120))]
    call_timeout: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeImagesOutput {
    #[serde(default)]
    images: Vec<Ec2Image>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ec2Image {
    image_id: String,
    #[serde(default)]
    creation_date: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesOutput {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<Ec2Instance>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RunInstancesOutput {
    instances: Vec<Ec2Instance>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ec2Instance {
    instance_id: String,
    #[serde(default)]
    state: Option<Ec2State>,
    #[serde(default)]
    private_ip_address: Option<String>,
    #[serde(default)]
    tags: Vec<Ec2Tag>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ec2State {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ec2Tag {
    key: String,
    value: String,
}

impl From<Ec2Instance> for InstanceDescription {
    fn from(instance: Ec2Instance) -> Self {
        Self {
            instance_id: instance.instance_id,
            state: instance
                .state
                .map(|s| InstanceState::from(s.name.as_str()))
                .unwrap_or(InstanceState::Unknown),
            private_address: instance.private_ip_address,
            tags: instance
                .tags
                .into_iter()
                .map(|t| Tag::new(t.key, t.value))
                .collect(),
        }
    }
}

/// Failure of one CLI call.
enum CallError {
    /// The API answered with an error code.
    Provider(ProviderError),
    /// The CLI couldn't be run or its output made no sense.
    Transport(anyhow::Error),
}

impl From<CallError> for anyhow::Error {
    fn from(e: CallError) -> Self {
        match e {
            CallError::Provider(e) => e.into(),
            CallError::Transport(e) => e,
        }
    }
}

impl From<CallError> for LaunchError {
    fn from(e: CallError) -> Self {
        match e {
            CallError::Provider(e) => LaunchError::Provider(e),
            CallError::Transport(e) => LaunchError::Transport(e),
        }
    }
}

fn parse_error(stderr: &str) -> Option<ProviderError> {
    let caps = AWS_ERROR.captures(stderr)?;
    Some(ProviderError::new(&caps[1], caps[2].trim()))
}

fn newest_image(output: DescribeImagesOutput) -> Option<String> {
    output
        .images
        .into_iter()
        .max_by(|a, b| a.creation_date.cmp(&b.creation_date))
        .map(|image| image.image_id)
}

fn tag_specifications(tags: &[Tag]) -> String {
    let tags: Vec<_> = tags
        .iter()
        .map(|t| serde_json::json!({ "Key": t.key, "Value": t.value }))
        .collect();
    serde_json::json!([
        { "ResourceType": "instance", "Tags": tags },
        { "ResourceType": "volume", "Tags": tags },
    ])
    .to_string()
}

fn market_options(max_price: f64) -> String {
    serde_json::json!({
        "MarketType": "spot",
        "SpotOptions": {
            "MaxPrice": max_price.to_string(),
            "SpotInstanceType": "one-time",
            "InstanceInterruptionBehavior": "terminate",
        }
    })
    .to_string()
}

fn run_instances_args(spec: &LaunchSpec) -> Vec<String> {
    let mut args: Vec<String> = [
        "run-instances",
        "--image-id",
        spec.image_id.as_str(),
        "--instance-type",
        spec.instance_type.as_str(),
        "--key-name",
        spec.key_name.as_str(),
        "--user-data",
        spec.user_data.as_str(),
        "--instance-initiated-shutdown-behavior",
        "terminate",
        "--count",
        "1",
        "--client-token",
        spec.client_token.as_str(),
    ]
    .into_iter()
    .map(String::from)
    .collect();
    if !spec.security_groups.is_empty() {
        args.push("--security-groups".to_string());
        args.extend(spec.security_groups.iter().cloned());
    }
    if !spec.tags.is_empty() {
        args.push("--tag-specifications".to_string());
        args.push(tag_specifications(&spec.tags));
    }
    if spec.unlimited_credits {
        args.push("--credit-specification".to_string());
        args.push("CpuCredits=unlimited".to_string());
    }
    if let MarketOption::Spot { max_price } = spec.market {
        args.push("--instance-market-options".to_string());
        args.push(market_options(max_price));
    }
    args
}

impl AwsCliProvider {
    /// Run `aws ec2 <args>` and decode its JSON output.
    async fn call<T: serde::de::DeserializeOwned>(&self, args: &[String]) -> Result<T, CallError> {
        let mut command = Command::new("aws");
        command
            .arg("ec2")
            .args(args)
            .args(["--region", self.region.as_str(), "--output", "json"])
            .kill_on_drop(true);
        let output = tokio::time::timeout(self.call_timeout, command.output())
            .await
            .map_err(|_| {
                CallError::Transport(anyhow!(
                    "aws ec2 {} timed out after {}s",
                    args.first().map(String::as_str).unwrap_or_default(),
                    self.call_timeout.as_secs()
                ))
            })?
            .context("Couldn't run the aws client")
            .map_err(CallError::Transport)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(match parse_error(&stderr) {
                Some(e) => CallError::Provider(e),
                None => CallError::Transport(anyhow!(
                    "aws client exited with {}: {}",
                    output.status,
                    stderr.trim()
                )),
            });
        }
        let stdout = if output.stdout.iter().all(u8::is_ascii_whitespace) {
            b"{}".as_slice()
        } else {
            output.stdout.as_slice()
        };
        serde_json::from_slice(stdout)
            .context("Unexpected output of the aws client")
            .map_err(CallError::Transport)
    }

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }
}

#[async_trait]
impl ComputeProvider for AwsCliProvider {
    async fn latest_image(&self, architecture: Architecture) -> anyhow::Result<String> {
        let output: DescribeImagesOutput = self
            .call(&Self::strings(&[
                "describe-images",
                "--owners",
                "amazon",
                "--filters",
                format!("Name=name,Values={}", self.image_name).as_str(),
                format!("Name=architecture,Values={architecture}").as_str(),
                "Name=state,Values=available",
                "Name=root-device-type,Values=ebs",
                "Name=virtualization-type,Values=hvm",
                "Name=image-type,Values=machine",
            ]))
            .await?;
        newest_image(output).ok_or_else(|| {
            anyhow!(
                "No image named {} for {architecture} in {}",
                self.image_name,
                self.region
            )
        })
    }

    async fn run_instance(&self, spec: &LaunchSpec) -> Result<LaunchedInstance, LaunchError> {
        let output: RunInstancesOutput = self.call(&run_instances_args(spec)).await?;
        let instance = output
            .instances
            .into_iter()
            .next()
            .ok_or_else(|| LaunchError::Transport(anyhow!("run-instances returned no instance")))?;
        Ok(LaunchedInstance {
            instance_id: instance.instance_id,
            private_address: instance.private_ip_address,
        })
    }

    async fn describe_instance(&self, instance_id: &str) -> anyhow::Result<InstanceDescription> {
        let output: DescribeInstancesOutput = self
            .call(&Self::strings(&["describe-instances", "--instance-ids", instance_id]))
            .await?;
        output
            .reservations
            .into_iter()
            .flat_map(|r| r.instances)
            .next()
            .map(InstanceDescription::from)
            .ok_or_else(|| anyhow!("Instance {instance_id} not found"))
    }

    async fn terminate_instance(&self, instance_id: &str) -> anyhow::Result<()> {
        let _: serde_json::Value = self
            .call(&Self::strings(&["terminate-instances", "--instance-ids", instance_id]))
            .await?;
        Ok(())
    }

    async fn list_tagged_instances(&self, tag: &Tag) -> anyhow::Result<Vec<InstanceDescription>> {
        let output: DescribeInstancesOutput = self
            .call(&Self::strings(&[
                "describe-instances",
                "--filters",
                format!("Name=tag:{},Values={}", tag.key, tag.value).as_str(),
                "Name=instance-state-name,Values=running",
            ]))
            .await?;
        Ok(output
            .reservations
            .into_iter()
            .flat_map(|r| r.instances)
            .map(InstanceDescription::from)
            .filter(|i| i.state == InstanceState::Running)
            .collect())
    }
}
