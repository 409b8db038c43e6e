use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::vo::DatasetRecord;

/// One aggregated measurement of a benchmark on an instance type at a CPU count.
///
/// A `None` score means the benchmark ran but produced no usable number. Such a
/// row still counts as benchmarked until it expires.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub provider: String,
    #[serde(rename = "instanceType")]
    pub instance_type: String,
    pub benchmark_id: String,
    #[serde(default)]
    pub benchmark_name: Option<String>,
    #[serde(rename = "benchmark_program", default)]
    pub program: Option<String>,
    #[serde(rename = "benchmark_cpus")]
    pub cpu_count: u32,
    #[serde(rename = "benchmark_score")]
    pub score: Option<f64>,
    #[serde(rename = "benchmark_cmd")]
    pub command: String,
    #[serde(rename = "date", with = "chrono::serde::ts_seconds")]
    pub observed_at: DateTime<Utc>,
}

pub type ResultKey = (String, String, String, u32);

impl DatasetRecord for BenchmarkResult {
    type Key = ResultKey;

    fn key(&self) -> Self::Key {
        (
            self.provider.clone(),
            self.instance_type.clone(),
            self.benchmark_id.clone(),
            self.cpu_count,
        )
    }
}
