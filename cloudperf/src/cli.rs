use std::cmp::Ordering;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use domain_benchmark::model::vo::ExpiryWindow;
use service_benchmark::{compose, plan_tasks, ComposeOptions};

use crate::infrastructure::service_provider::ServiceProvider;

#[derive(Parser, Debug)]
#[command(name = "cloudperf", version, about = "Benchmark cloud instance types and rank them by price")]
pub struct Cli {
    /// Extra YAML configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Benchmark the instance types of a price dataset and merge the results into a performance dataset.
    WritePerformance {
        /// Price dataset listing the instance types.
        #[arg(long)]
        prices: String,
        /// Performance dataset to update.
        #[arg(long)]
        file: String,
        /// Ignore the existing dataset, benchmark everything and replace it.
        #[arg(long)]
        no_update: bool,
        /// Re-run benchmarks older than this, e.g. `12w`.
        #[arg(long)]
        expire: Option<ExpiryWindow>,
    },
    /// Merge a new price dataset into an existing one.
    MergePrices {
        #[arg(long)]
        file: String,
        #[arg(long)]
        new: String,
    },
    /// Join performance and price datasets into price/performance rows.
    Perfprice {
        #[arg(long)]
        prices: String,
        #[arg(long)]
        perf: String,
        /// Only keep the highest CPU count per instance type and benchmark.
        #[arg(long)]
        max_cpus: bool,
        /// Price spot rows by their defined-duration block of this many hours.
        #[arg(long)]
        duration: Option<u32>,
        /// Write JSON here instead of standard output.
        #[arg(long)]
        output: Option<String>,
    },
    /// Print a price dataset, cheapest first.
    Prices {
        #[arg(long)]
        prices: String,
    },
    /// Print a performance dataset, best score first.
    Performance {
        #[arg(long)]
        perf: String,
    },
    /// Terminate every instance this tool left running.
    TerminateInstances,
}

/// Run one command. `Ok(false)` means the command finished but hit a fatal
/// condition on the way.
pub async fn run(command: Command, provider: &ServiceProvider) -> anyhow::Result<bool> {
    match command {
        Command::WritePerformance {
            prices,
            file,
            no_update,
            expire,
        } => write_performance(provider, &prices, &file, no_update, expire).await,
        Command::MergePrices { file, new } => {
            let datasets = provider.price_datasets();
            let new = datasets.load(&new).await?;
            datasets.merge_into(&file, new).await?;
            Ok(true)
        }
        Command::Perfprice {
            prices,
            perf,
            max_cpus,
            duration,
            output,
        } => {
            let prices = provider.price_datasets().load(&prices).await?;
            let perf = provider.perf_datasets().load(&perf).await?;
            let options = ComposeOptions {
                max_cpus_only: max_cpus,
                block_duration_hours: duration,
            };
            let rows = compose(&perf, &prices, &options);
            let json = serde_json::to_string_pretty(&rows)?;
            match output {
                Some(output) => tokio::fs::write(&output, json)
                    .await
                    .with_context(|| format!("Couldn't write {output}"))?,
                None => println!("{json}"),
            }
            Ok(true)
        }
        Command::Prices { prices } => {
            let mut offers = provider.price_datasets().load(&prices).await?;
            offers.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal));
            println!(
                "{:<20} {:<16} {:<16} {:>5} {:>9} {:>10}",
                "instanceType", "region", "spot-az", "vcpu", "memory", "price"
            );
            for offer in offers {
                println!(
                    "{:<20} {:<16} {:<16} {:>5} {:>9.1} {:>10.4}",
                    offer.instance_type,
                    offer.region,
                    offer.spot_availability_zone.as_deref().unwrap_or("-"),
                    offer.vcpu_count,
                    offer.memory_gib,
                    offer.price
                );
            }
            Ok(true)
        }
        Command::Performance { perf } => {
            let mut rows = provider.perf_datasets().load(&perf).await?;
            // Missing scores last.
            rows.sort_by(|a, b| match (a.score, b.score) {
                (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            });
            println!(
                "{:<20} {:<20} {:>5} {:>14}",
                "instanceType", "benchmark_id", "cpus", "score"
            );
            for row in rows {
                let score = row.score.map(|s| format!("{s:.2}")).unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<20} {:<20} {:>5} {:>14}",
                    row.instance_type, row.benchmark_id, row.cpu_count, score
                );
            }
            Ok(true)
        }
        Command::TerminateInstances => {
            let terminated = provider.fleet().sweep().await?;
            println!("Terminated {} instances.", terminated.len());
            for instance_id in terminated {
                println!("{instance_id}");
            }
            Ok(true)
        }
    }
}

async fn write_performance(
    provider: &ServiceProvider,
    prices: &str,
    file: &str,
    no_update: bool,
    expire: Option<ExpiryWindow>,
) -> anyhow::Result<bool> {
    let offers = provider.price_datasets().load(prices).await?;
    let previous = if no_update {
        None
    } else {
        Some(provider.perf_datasets().load(file).await?)
    };
    let expiry = expire.unwrap_or(*provider.config().expire());
    let (tasks, skipped) = plan_tasks(
        &offers,
        provider.catalog(),
        &provider.blacklist(),
        previous.as_deref(),
        expiry,
        Utc::now(),
    );
    tracing::info!(
        "{} instance types to benchmark, {} skipped.",
        tasks.len(),
        skipped.len()
    );

    let report = provider.fleet().run(tasks).await;
    for (instance_type, reason) in &report.skipped {
        tracing::warn!("{instance_type} wasn't benchmarked: {reason:?}");
    }
    // Collected rows are kept even after a fatal condition.
    if no_update {
        provider.perf_datasets().persist(file, &report.results).await?;
    } else {
        provider.perf_datasets().merge_into(file, report.results).await?;
    }
    if report.fatal {
        tracing::error!("A fatal provider error was seen, check the configuration.");
    }
    Ok(!report.fatal)
}
