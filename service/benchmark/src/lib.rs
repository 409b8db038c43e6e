mod acquisition;
mod command;
mod composer;
mod fleet;
mod merge;
mod planner;
mod runner;
mod session_bootstrap;

#[rustfmt::skip]
pub use {
    acquisition::{InstanceAcquisitionServiceImpl, LaunchTemplate},
    composer::{compose, ComposeOptions},
    fleet::FleetServiceImpl,
    merge::{owed_benchmarks, DatasetMergeService},
    planner::plan_tasks,
    runner::BenchmarkRunnerServiceImpl,
    session_bootstrap::SessionBootstrapServiceImpl,
};

/// Tag every instance rented by this system carries.
pub fn application_tag() -> domain_benchmark::model::vo::Tag {
    domain_benchmark::model::vo::Tag::new("Application", "cloudperf")
}
