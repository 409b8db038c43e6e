use crate::model::entity::{AcquiredInstance, BenchmarkDefinition, BenchmarkResult, InstanceOffer};

use super::{Architecture, ProviderErrorCategory, Tag};

/// Ask for one instance of a type.
#[derive(Clone, Debug, PartialEq)]
pub struct AcquisitionRequest {
    pub instance_type: String,
    pub architecture: Architecture,
    pub image_id: String,
    /// Spot ceiling, the last known on-demand price.
    pub max_spot_price: f64,
    /// Caller tags, the fixed application tag is added on top.
    pub tags: Vec<Tag>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AcquisitionOutcome {
    Acquired(AcquiredInstance),
    /// Retrying can't help.
    Abandoned {
        category: ProviderErrorCategory,
        fatal: bool,
    },
    /// The retry budget ran out.
    Exhausted { attempts: u32 },
}

/// The machine a benchmark matrix runs on.
#[derive(Clone, Debug, PartialEq)]
pub struct BenchmarkTarget {
    pub provider: String,
    pub instance_type: String,
    pub vcpu_count: u32,
    pub architecture: Architecture,
}

impl From<&InstanceOffer> for BenchmarkTarget {
    fn from(offer: &InstanceOffer) -> Self {
        Self {
            provider: offer.provider.clone(),
            instance_type: offer.instance_type.clone(),
            vcpu_count: offer.vcpu_count,
            architecture: offer.architecture,
        }
    }
}

/// One worker's job: benchmark one instance type.
#[derive(Clone, Debug, PartialEq)]
pub struct BenchmarkTask {
    /// The on-demand offer of the instance type.
    pub offer: InstanceOffer,
    /// Benchmarks still owed for this type.
    pub benchmarks: Vec<BenchmarkDefinition>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Blacklisted,
    UpToDate,
    NoImage,
    NotAcquired,
    NoSession,
    Crashed,
}

/// Outcome of a whole fleet run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FleetReport {
    pub results: Vec<BenchmarkResult>,
    pub skipped: Vec<(String, SkipReason)>,
    /// A fatal condition was seen; collected results are still valid.
    pub fatal: bool,
}
