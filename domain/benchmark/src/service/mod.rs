mod acquisition;
mod compute_provider;
mod fleet;
mod remote_session;
mod runner;
mod session_bootstrap;

#[rustfmt::skip]
pub use self::{
    acquisition::InstanceAcquisitionService,
    compute_provider::ComputeProvider,
    fleet::FleetService,
    remote_session::{RemoteSession, SessionConnector},
    runner::BenchmarkRunnerService,
    session_bootstrap::SessionBootstrapService,
};
