use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static BURSTABLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^t[0-9]+[a-z]*\.").unwrap());

/// Burstable instance types accrue CPU credits and are throttled without them.
pub fn is_burstable(instance_type: &str) -> bool {
    BURSTABLE.is_match(instance_type)
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MarketOption {
    /// One-time spot request, terminated on interruption.
    Spot { max_price: f64 },
    OnDemand,
}

impl MarketOption {
    pub fn is_spot(&self) -> bool {
        matches!(self, Self::Spot { .. })
    }
}

/// Everything needed for one launch request.
#[derive(Clone, Debug, PartialEq)]
pub struct LaunchSpec {
    pub instance_type: String,
    pub image_id: String,
    pub key_name: String,
    pub security_groups: Vec<String>,
    pub user_data: String,
    /// Attached to the instance and its volumes.
    pub tags: Vec<Tag>,
    pub unlimited_credits: bool,
    pub market: MarketOption,
    /// Idempotency token, unique per request.
    pub client_token: String,
}
