use std::collections::HashSet;

use chrono::{DateTime, Utc};
use domain_benchmark::model::{
    entity::{BenchmarkDefinition, BenchmarkResult, InstanceOffer},
    vo::{Blacklist, BenchmarkTask, ExpiryWindow, SkipReason},
};

use crate::merge::owed_benchmarks;

/// Turn a price dataset into the fleet's work list.
///
/// Only on-demand offers are considered, the first offer of each instance type
/// wins. Without `previous` every catalog benchmark is owed.
pub fn plan_tasks(
    offers: &[InstanceOffer],
    catalog: &[BenchmarkDefinition],
    blacklist: &Blacklist,
    previous: Option<&[BenchmarkResult]>,
    expiry: ExpiryWindow,
    now: DateTime<Utc>,
) -> (Vec<BenchmarkTask>, Vec<(String, SkipReason)>) {
    let mut seen = HashSet::new();
    let mut tasks = vec![];
    let mut skipped = vec![];
    let today = now.date_naive();

    for offer in offers.iter().filter(|offer| !offer.is_spot) {
        if !seen.insert(offer.instance_type.as_str()) {
            continue;
        }
        if blacklist.is_blacklisted(&offer.instance_type, today) {
            tracing::info!("Skipping blacklisted {}.", offer.instance_type);
            skipped.push((offer.instance_type.clone(), SkipReason::Blacklisted));
            continue;
        }
        let benchmarks = match previous {
            Some(previous) => owed_benchmarks(
                &offer.provider,
                &offer.instance_type,
                catalog,
                previous,
                expiry,
                now,
            ),
            None => catalog.to_vec(),
        };
        if benchmarks.is_empty() {
            tracing::debug!("{} is up to date.", offer.instance_type);
            skipped.push((offer.instance_type.clone(), SkipReason::UpToDate));
            continue;
        }
        tasks.push(BenchmarkTask {
            offer: offer.clone(),
            benchmarks,
        });
    }
    tracing::info!(
        "Planned {} instance types, {} skipped.",
        tasks.len(),
        skipped.len()
    );
    (tasks, skipped)
}
