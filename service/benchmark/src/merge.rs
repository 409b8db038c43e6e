use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use domain_benchmark::{
    model::{
        entity::{BenchmarkDefinition, BenchmarkResult},
        vo::{upsert, DatasetRecord, ExpiryWindow},
    },
    repository::DatasetRepo,
};

/// Benchmarks of `catalog` without a fresh row for the instance type in
/// `previous`. A row with a null score still counts as fresh.
pub fn owed_benchmarks(
    provider: &str,
    instance_type: &str,
    catalog: &[BenchmarkDefinition],
    previous: &[BenchmarkResult],
    expiry: ExpiryWindow,
    now: DateTime<Utc>,
) -> Vec<BenchmarkDefinition> {
    let window = expiry.as_chrono();
    let fresh: HashSet<&str> = previous
        .iter()
        .filter(|row| {
            row.provider == provider
                && row.instance_type == instance_type
                && now - row.observed_at < window
        })
        .map(|row| row.benchmark_id.as_str())
        .collect();
    catalog
        .iter()
        .filter(|definition| !fresh.contains(definition.id.as_str()))
        .cloned()
        .collect()
}

/// Load, merge and persist one dataset.
pub struct DatasetMergeService<T: DatasetRecord + Send + Sync + 'static> {
    repo: Arc<dyn DatasetRepo<T>>,
}

impl<T: DatasetRecord + Send + Sync + 'static> DatasetMergeService<T> {
    pub fn new(repo: Arc<dyn DatasetRepo<T>>) -> Self {
        Self { repo }
    }

    pub async fn load(&self, location: &str) -> anyhow::Result<Vec<T>> {
        self.repo.load(location).await
    }

    /// Upsert `new` into the dataset at `location` and return what was written.
    pub async fn merge_into(&self, location: &str, new: Vec<T>) -> anyhow::Result<Vec<T>> {
        let old = self.repo.load(location).await?;
        let (old_len, new_len) = (old.len(), new.len());
        let merged = upsert(old, new);
        tracing::info!(
            "Merging {new_len} rows into {old_len} rows of {location}, {} rows now.",
            merged.len()
        );
        self.repo.persist(location, &merged).await?;
        Ok(merged)
    }

    pub async fn persist(&self, location: &str, rows: &[T]) -> anyhow::Result<()> {
        self.repo.persist(location, rows).await
    }
}
