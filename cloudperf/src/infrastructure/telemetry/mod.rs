mod config;

pub use self::config::*;
use tracing::metadata::LevelFilter;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{
    fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

fn fmt_layer<W>(writer: W, verbose: bool, ansi: bool) -> Box<dyn Layer<Registry> + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_ansi(ansi)
        .with_writer(writer)
        .with_file(verbose)
        .with_line_number(verbose)
        .with_thread_ids(verbose)
        .with_target(verbose)
        .boxed()
}

/// Install the global subscriber. Logging stays off when disabled.
pub fn initialize_telemetry(config: &TelemetryConfig) -> anyhow::Result<()> {
    if !*config.enable() {
        return Ok(());
    }
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from(*config.level()).into())
        .parse_lossy(config.directives());

    let mut layers = Vec::new();
    if *config.console() {
        // stdout carries command output.
        layers.push(fmt_layer(std::io::stderr, *config.verbose(), true));
    }
    if let Some(file) = config.file() {
        let appender =
            RollingFileAppender::new((*file.rotation()).into(), file.directory(), file.prefix());
        layers.push(fmt_layer(appender, *config.verbose(), false));
    }
    Registry::default().with(layers).with(filter).try_init()?;
    Ok(())
}
