use crate::model::vo::DatasetRecord;

/// Whole-file storage of a dataset.
#[async_trait::async_trait]
pub trait DatasetRepo<T: DatasetRecord + Send + Sync>: Send + Sync {
    /// Load every row at `location`, an absent dataset is empty.
    async fn load(&self, location: &str) -> anyhow::Result<Vec<T>>;

    /// Replace the dataset at `location`. Readers see either the old or the
    /// new content, never a partial write.
    async fn persist(&self, location: &str, rows: &[T]) -> anyhow::Result<()>;
}
