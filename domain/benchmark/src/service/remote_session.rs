use std::sync::Arc;
use std::time::Duration;

use crate::model::vo::CommandOutput;

/// An authenticated command channel to one rented instance.
#[async_trait::async_trait]
pub trait RemoteSession: Send + Sync {
    /// Run `command` in a shell. A timeout or a non-zero exit is reported in the
    /// output, `Err` means the channel itself is broken.
    async fn exec(&self, command: &str, timeout: Duration) -> anyhow::Result<CommandOutput>;

    /// Write a small text file relative to the remote home directory.
    async fn write_file(&self, path: &str, contents: &str, mode: u32) -> anyhow::Result<()>;
}

#[async_trait::async_trait]
pub trait SessionConnector: Send + Sync {
    /// Make one connection attempt.
    async fn connect(&self, address: &str) -> anyhow::Result<Arc<dyn RemoteSession>>;
}
