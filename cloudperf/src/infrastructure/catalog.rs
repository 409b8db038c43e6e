use std::collections::BTreeMap;

use anyhow::Context;
use domain_benchmark::model::{entity::BenchmarkDefinition, vo::ScoreAggregation};

fn stress_ng(id: &str, name: &str, cmd: &str) -> BenchmarkDefinition {
    BenchmarkDefinition {
        id: id.to_string(),
        name: name.to_string(),
        program: Some("stress-ng".to_string()),
        images: BTreeMap::from([
            ("x86_64".to_string(), "brafsn/stress-ng-x86_64".to_string()),
            ("arm64".to_string(), "brafsn/stress-ng-arm64".to_string()),
        ]),
        cmd: cmd.to_string(),
        cpus: None,
        iterations: BenchmarkDefinition::default_iterations(),
        timeout: None,
        score_aggregation: ScoreAggregation::Max,
        docker_opts: BenchmarkDefinition::default_docker_opts(),
        files: BTreeMap::new(),
        compose: None,
    }
}

pub fn default_catalog() -> Vec<BenchmarkDefinition> {
    vec![
        stress_ng(
            "sng_matrixprod",
            "stress-ng matrixprod",
            "--cpu {{numcpu}} --cpu-method matrixprod -t 10 --metrics 2>&1 | tail -1 | awk '{print $9}'",
        ),
        stress_ng(
            "sng_zlib",
            "stress-ng zlib",
            "--zlib {{numcpu}} --zlib-method fixed -t 10 --metrics 2>&1 | tail -1 | awk '{print $9}'",
        ),
    ]
}

/// Read a catalog file, a YAML list of benchmark definitions.
pub async fn load_catalog(path: Option<&str>) -> anyhow::Result<Vec<BenchmarkDefinition>> {
    let Some(path) = path else {
        return Ok(default_catalog());
    };
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Couldn't read benchmark catalog {path}"))?;
    parse_catalog(&content).with_context(|| format!("Invalid benchmark catalog {path}"))
}

fn parse_catalog(content: &str) -> anyhow::Result<Vec<BenchmarkDefinition>> {
    let catalog: Vec<BenchmarkDefinition> = serde_yaml::from_str(content)?;
    let mut ids = std::collections::HashSet::new();
    if let Some(duplicate) = catalog.iter().find(|d| !ids.insert(d.id.as_str())) {
        anyhow::bail!("Benchmark id {} is defined twice", duplicate.id);
    }
    Ok(catalog)
}
