use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::vo::{Architecture, DatasetRecord};

/// One price observation for an instance type, produced by the pricing collector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstanceOffer {
    pub provider: String,
    #[serde(rename = "instanceType")]
    pub instance_type: String,
    pub region: String,
    #[serde(rename = "cpu_arch", default)]
    pub architecture: Architecture,
    #[serde(rename = "vcpu")]
    pub vcpu_count: u32,
    #[serde(rename = "memory")]
    pub memory_gib: f64,
    /// Hourly price in USD.
    pub price: f64,
    #[serde(rename = "spot")]
    pub is_spot: bool,
    #[serde(rename = "spot-az", default)]
    pub spot_availability_zone: Option<String>,
    #[serde(rename = "date", with = "chrono::serde::ts_seconds")]
    pub observed_at: DateTime<Utc>,
    /// Columns not modelled above, e.g. `location` or the `price_6h` block
    /// prices. Kept so rewriting a dataset doesn't lose them.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl InstanceOffer {
    /// Defined-duration block price from the `price_{hours}h` column.
    pub fn block_price(&self, hours: u32) -> Option<f64> {
        self.extra
            .get(&format!("price_{hours}h"))
            .and_then(serde_json::Value::as_f64)
    }
}

pub type OfferKey = (String, String, String, bool, Option<String>);

impl DatasetRecord for InstanceOffer {
    type Key = OfferKey;

    fn key(&self) -> Self::Key {
        (
            self.provider.clone(),
            self.instance_type.clone(),
            self.region.clone(),
            self.is_spot,
            self.spot_availability_zone.clone(),
        )
    }
}
