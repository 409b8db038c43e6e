use thiserror::Error;

pub type CloudPerfResult<T> = Result<T, CloudPerfException>;

#[derive(Error, Debug)]
pub enum CloudPerfException {
    #[error("Invalid duration: {value}, expected something like `12w`, `3d`, `1h30m` or seconds.")]
    InvalidDuration { value: String },

    #[error("Instance {instance_id} doesn't have a reachable address.")]
    NoAddress { instance_id: String },

    #[error("Couldn't open a session to {address} within {seconds}s.")]
    SessionTimeout { address: String, seconds: u64 },

    #[error("Bootstrap script failed on {instance_id} after {attempts} attempts: {output}")]
    BootstrapFailed {
        instance_id: String,
        attempts: u32,
        output: String,
    },

    #[error("Couldn't find container image for benchmark {benchmark_id} on {architecture}.")]
    NoImage {
        benchmark_id: String,
        architecture: String,
    },

    #[error("Couldn't render command template of benchmark {benchmark_id}: {reason}")]
    Template {
        benchmark_id: String,
        reason: String,
    },

    #[error("Couldn't access dataset {location}: {source}")]
    DatasetIo {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {source}")]
    InternalError {
        #[source]
        source: anyhow::Error,
    },
}

impl From<anyhow::Error> for CloudPerfException {
    fn from(e: anyhow::Error) -> Self {
        CloudPerfException::InternalError { source: e }
    }
}
