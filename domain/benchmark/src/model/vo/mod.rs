mod aggregation;
mod architecture;
mod blacklist;
mod command_output;
mod dataset;
mod expiry;
mod instance;
mod launch;
mod provider_error;
mod report;

#[rustfmt::skip]
pub use {
    aggregation::ScoreAggregation,
    architecture::Architecture,
    blacklist::{Blacklist, BlacklistEntry},
    command_output::CommandOutput,
    dataset::{upsert, DatasetRecord},
    expiry::ExpiryWindow,
    instance::{InstanceDescription, InstanceState, LaunchedInstance},
    launch::{is_burstable, LaunchSpec, MarketOption, Tag},
    provider_error::{classify, Classification, LaunchError, ProviderError, ProviderErrorCategory},
    report::{AcquisitionOutcome, AcquisitionRequest, BenchmarkTarget, BenchmarkTask, FleetReport, SkipReason},
};
