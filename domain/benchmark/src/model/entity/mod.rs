pub mod acquired_instance;
pub mod benchmark_definition;
pub mod benchmark_result;
pub mod instance_offer;
pub mod perf_price;

#[rustfmt::skip]
pub use {
    acquired_instance::AcquiredInstance,
    benchmark_definition::{BenchmarkDefinition, ServiceTopology},
    benchmark_result::BenchmarkResult,
    instance_offer::InstanceOffer,
    perf_price::PerfPriceRow,
};
