use crate::model::vo::{AcquisitionOutcome, AcquisitionRequest};

#[async_trait::async_trait]
pub trait InstanceAcquisitionService: Send + Sync {
    /// Rent one instance, spot first. Never fails the run, a type that can't be
    /// acquired is reported in the outcome.
    async fn acquire(&self, request: &AcquisitionRequest) -> AcquisitionOutcome;
}
