use crate::model::vo::Architecture;

/// A rented instance, alive from a successful acquisition until its worker
/// terminates it.
#[derive(Clone, Debug, PartialEq)]
pub struct AcquiredInstance {
    pub instance_id: String,
    /// Address reported at launch, may be refreshed once the instance runs.
    pub private_address: Option<String>,
    pub instance_type: String,
    pub architecture: Architecture,
    /// Spot ceiling this instance was bought with, `None` for on-demand.
    pub spot_price: Option<f64>,
}

impl AcquiredInstance {
    pub fn is_spot(&self) -> bool {
        self.spot_price.is_some()
    }
}
