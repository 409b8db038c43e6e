use serde::{Deserialize, Serialize};

use super::BenchmarkResult;

/// A performance row joined with one of its instance type's price rows.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerfPriceRow {
    #[serde(flatten)]
    pub result: BenchmarkResult,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub spot: Option<bool>,
    #[serde(rename = "spot-az", default)]
    pub spot_availability_zone: Option<String>,
    #[serde(default)]
    pub score_per_price: Option<f64>,
    #[serde(default)]
    pub score_per_price_per_cpu: Option<f64>,
}
