use std::{io::ErrorKind, marker::PhantomData, path::Path};

use anyhow::Context;
use async_trait::async_trait;
use domain_benchmark::{
    exception::CloudPerfException, model::vo::DatasetRecord, repository::DatasetRepo,
};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

/// Datasets stored as JSON arrays of records.
pub struct JsonDatasetRepo<T> {
    _record: PhantomData<fn() -> T>,
}

impl<T> Default for JsonDatasetRepo<T> {
    fn default() -> Self {
        Self {
            _record: PhantomData,
        }
    }
}

#[async_trait]
impl<T> DatasetRepo<T> for JsonDatasetRepo<T>
where
    T: DatasetRecord + Serialize + DeserializeOwned + Send + Sync,
{
    async fn load(&self, location: &str) -> anyhow::Result<Vec<T>> {
        let content = match tokio::fs::read(location).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!("{location} doesn't exist yet, starting empty.");
                return Ok(vec![]);
            }
            Err(source) => {
                return Err(CloudPerfException::DatasetIo {
                    location: location.to_string(),
                    source,
                }
                .into())
            }
        };
        serde_json::from_slice(&content).with_context(|| format!("Invalid dataset {location}"))
    }

    async fn persist(&self, location: &str, rows: &[T]) -> anyhow::Result<()> {
        let content = serde_json::to_vec_pretty(rows)?;
        let file_name = Path::new(location)
            .file_name()
            .with_context(|| format!("{location} isn't a file path"))?
            .to_string_lossy();
        // Same directory, so the rename can't cross file systems.
        let temp = Path::new(location).with_file_name(format!(".{file_name}.{}", Uuid::new_v4()));
        let written = match tokio::fs::write(&temp, content).await {
            Ok(()) => tokio::fs::rename(&temp, location).await,
            Err(e) => Err(e),
        };
        if let Err(source) = written {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(CloudPerfException::DatasetIo {
                location: location.to_string(),
                source,
            }
            .into());
        }
        tracing::info!("Wrote {} rows to {location}.", rows.len());
        Ok(())
    }
}
