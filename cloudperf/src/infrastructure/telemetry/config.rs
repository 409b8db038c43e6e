use getset::Getters;
use serde::*;
use tracing::metadata::LevelFilter;
use tracing_appender::rolling::Rotation;

/// `common.telemetry`. Events go to stderr, and also to a log file when
/// `file` is set.
#[derive(Deserialize, Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct TelemetryConfig {
    #[serde(default = "TelemetryConfig::default_enable")]
    enable: bool,
    #[serde(default)]
    level: LoggingLevel,
    /// Extra `EnvFilter` directives, e.g. `service_benchmark=debug`.
    #[serde(default)]
    directives: String,
    /// Print file, line, thread and target with every event.
    #[serde(default)]
    verbose: bool,
    #[serde(default = "TelemetryConfig::default_enable")]
    console: bool,
    #[serde(default)]
    file: Option<FileConfig>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enable: Self::default_enable(),
            level: Default::default(),
            directives: Default::default(),
            verbose: Default::default(),
            console: Self::default_enable(),
            file: Default::default(),
        }
    }
}

impl TelemetryConfig {
    fn default_enable() -> bool {
        true
    }
}

#[derive(Default, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
    Off,
}

impl From<LoggingLevel> for LevelFilter {
    fn from(val: LoggingLevel) -> Self {
        match val {
            LoggingLevel::Error => LevelFilter::ERROR,
            LoggingLevel::Warn => LevelFilter::WARN,
            LoggingLevel::Info => LevelFilter::INFO,
            LoggingLevel::Debug => LevelFilter::DEBUG,
            LoggingLevel::Trace => LevelFilter::TRACE,
            LoggingLevel::Off => LevelFilter::OFF,
        }
    }
}

#[derive(Deserialize, Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct FileConfig {
    #[serde(default = "FileConfig::default_directory")]
    directory: String,
    /// File name, or its prefix when rotating.
    #[serde(default = "FileConfig::default_prefix")]
    prefix: String,
    #[serde(default)]
    rotation: RotationLevel,
}

impl FileConfig {
    fn default_directory() -> String {
        "./logs".to_string()
    }
    fn default_prefix() -> String {
        "cloudperf.log".to_string()
    }
}

#[derive(Default, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationLevel {
    Daily,
    Hourly,
    #[default]
    Never,
}

impl From<RotationLevel> for Rotation {
    fn from(val: RotationLevel) -> Self {
        match val {
            RotationLevel::Daily => Rotation::DAILY,
            RotationLevel::Hourly => Rotation::HOURLY,
            RotationLevel::Never => Rotation::NEVER,
        }
    }
}
