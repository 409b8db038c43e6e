use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::vo::{Architecture, ScoreAggregation};

/// A benchmark to run on every instance type, as described in the catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkDefinition {
    /// Unique id, also the `benchmark_id` of produced rows.
    pub id: String,
    /// Verbose name.
    pub name: String,
    /// Name of the benchmark program, informative only.
    #[serde(default)]
    pub program: Option<String>,
    /// Container image per architecture name (`x86_64`, `arm64`).
    pub images: BTreeMap<String, String>,
    /// Command passed to the container, `{{numcpu}}` is replaced by the
    /// exercised CPU count. It must print a single number.
    pub cmd: String,
    /// Explicit CPU counts, one run per available vCPU when absent.
    #[serde(default)]
    pub cpus: Option<Vec<u32>>,
    #[serde(default = "BenchmarkDefinition::default_iterations")]
    pub iterations: u32,
    /// Kill the container after this many seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub score_aggregation: ScoreAggregation,
    #[serde(default = "BenchmarkDefinition::default_docker_opts")]
    pub docker_opts: String,
    /// Files written to the remote home directory before pulling the image.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub compose: Option<ServiceTopology>,
}

/// Multi-container services the benchmark talks to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceTopology {
    /// Content of `docker-compose.yml`.
    pub compose_file: String,
    /// Script run once the services are up.
    #[serde(default)]
    pub after_up: Option<String>,
    /// Script run once the services are down.
    #[serde(default)]
    pub after_down: Option<String>,
}

impl BenchmarkDefinition {
    pub fn default_iterations() -> u32 {
        3
    }

    pub fn default_docker_opts() -> String {
        "--network none".to_string()
    }

    pub fn image_for(&self, architecture: Architecture) -> Option<&str> {
        self.images.get(architecture.as_str()).map(String::as_str)
    }

    /// CPU counts to exercise on a machine with `vcpu_count` vCPUs.
    pub fn cpu_sweep(&self, vcpu_count: u32) -> Vec<u32> {
        match &self.cpus {
            Some(cpus) if !cpus.is_empty() => cpus.clone(),
            _ => (1..=vcpu_count).collect(),
        }
    }

    /// `timeout` wrapper prepended to each run, empty without a timeout.
    pub fn timeout_prefix(&self) -> String {
        match self.timeout {
            Some(timeout) => format!("timeout -k {} {} ", timeout + 5, timeout),
            None => String::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn parse_catalog_entry() {
        let s = indoc! {r#"
            id: sng_zlib
            name: stress-ng zlib
            program: stress-ng
            images:
              x86_64: brafsn/stress-ng-x86_64
              arm64: brafsn/stress-ng-arm64
            cmd: "--zlib {{numcpu}} -t 10 --metrics 2>&1 | tail -1 | awk '{print $9}'"
            cpus: [1, 2, 4]
            timeout: 60
        "#};
        let definition: BenchmarkDefinition = serde_yaml::from_str(s).unwrap();
        assert_eq!(definition.iterations, 3);
        assert_eq!(definition.score_aggregation, ScoreAggregation::Max);
        assert_eq!(definition.docker_opts, "--network none");
        assert_eq!(definition.image_for(Architecture::Arm64), Some("brafsn/stress-ng-arm64"));
        assert_eq!(definition.cpu_sweep(16), vec![1, 2, 4]);
        assert_eq!(definition.timeout_prefix(), "timeout -k 65 60 ");
        assert!(definition.compose.is_none());
    }

    #[test]
    fn sweep_every_vcpu_without_explicit_list() {
        let definition = BenchmarkDefinition {
            id: "b".to_string(),
            name: "b".to_string(),
            program: None,
            images: BTreeMap::new(),
            cmd: "true".to_string(),
            cpus: Some(vec![]),
            iterations: 1,
            timeout: None,
            score_aggregation: ScoreAggregation::Max,
            docker_opts: BenchmarkDefinition::default_docker_opts(),
            files: BTreeMap::new(),
            compose: None,
        };
        assert_eq!(definition.cpu_sweep(4), vec![1, 2, 3, 4]);
        assert_eq!(definition.timeout_prefix(), "");
        assert_eq!(definition.image_for(Architecture::X86_64), None);
    }
}
