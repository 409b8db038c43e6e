use std::collections::HashMap;

use domain_benchmark::model::entity::{BenchmarkResult, InstanceOffer, PerfPriceRow};

#[derive(Clone, Debug, Default, typed_builder::TypedBuilder)]
pub struct ComposeOptions {
    /// Keep only the highest CPU count row per instance type and benchmark.
    #[builder(default)]
    pub max_cpus_only: bool,
    /// Price spot rows at their defined-duration block price, when they have one.
    #[builder(default, setter(strip_option))]
    pub block_duration_hours: Option<u32>,
}

/// Join performance rows with the price rows of their instance type.
///
/// Every perf row yields one output row per matching offer, or a single row
/// with empty price fields when nothing matches.
pub fn compose(
    perf: &[BenchmarkResult],
    prices: &[InstanceOffer],
    options: &ComposeOptions,
) -> Vec<PerfPriceRow> {
    let mut offers: HashMap<(&str, &str), Vec<&InstanceOffer>> = HashMap::new();
    for offer in prices {
        offers
            .entry((offer.provider.as_str(), offer.instance_type.as_str()))
            .or_default()
            .push(offer);
    }

    let max_cpus = options.max_cpus_only.then(|| max_cpu_counts(perf));
    let mut rows = vec![];
    for result in perf {
        if let Some(max_cpus) = &max_cpus {
            let key = (
                result.provider.as_str(),
                result.instance_type.as_str(),
                result.benchmark_id.as_str(),
            );
            if max_cpus.get(&key) != Some(&result.cpu_count) {
                continue;
            }
        }
        match offers.get(&(result.provider.as_str(), result.instance_type.as_str())) {
            Some(matching) => rows.extend(
                matching
                    .iter()
                    .map(|offer| priced_row(result, offer, options.block_duration_hours)),
            ),
            None => rows.push(PerfPriceRow {
                result: result.clone(),
                region: None,
                price: None,
                spot: None,
                spot_availability_zone: None,
                score_per_price: None,
                score_per_price_per_cpu: None,
            }),
        }
    }
    rows
}

fn max_cpu_counts(perf: &[BenchmarkResult]) -> HashMap<(&str, &str, &str), u32> {
    let mut max_cpus: HashMap<(&str, &str, &str), u32> = HashMap::new();
    for result in perf {
        let entry = max_cpus
            .entry((
                result.provider.as_str(),
                result.instance_type.as_str(),
                result.benchmark_id.as_str(),
            ))
            .or_insert(result.cpu_count);
        *entry = (*entry).max(result.cpu_count);
    }
    max_cpus
}

fn priced_row(
    result: &BenchmarkResult,
    offer: &InstanceOffer,
    block_duration_hours: Option<u32>,
) -> PerfPriceRow {
    let price = block_duration_hours
        .filter(|_| offer.is_spot)
        .and_then(|hours| offer.block_price(hours))
        .unwrap_or(offer.price);
    let score_per_price = per_price(result.score, price);
    PerfPriceRow {
        result: result.clone(),
        region: Some(offer.region.clone()),
        price: Some(price),
        spot: Some(offer.is_spot),
        spot_availability_zone: offer.spot_availability_zone.clone(),
        score_per_price,
        score_per_price_per_cpu: score_per_price
            .filter(|_| result.cpu_count > 0)
            .map(|value| value / result.cpu_count as f64),
    }
}

fn per_price(score: Option<f64>, price: f64) -> Option<f64> {
    match score {
        Some(score) if price > 0.0 => Some(score / price),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use domain_benchmark::model::vo::Architecture;

    use super::*;

    fn result(instance_type: &str, cpu_count: u32, score: Option<f64>) -> BenchmarkResult {
        BenchmarkResult {
            provider: "aws".to_string(),
            instance_type: instance_type.to_string(),
            benchmark_id: "sng_zlib".to_string(),
            benchmark_name: None,
            program: None,
            cpu_count,
            score,
            command: String::default(),
            observed_at: Utc::now(),
        }
    }

    fn offer(instance_type: &str, is_spot: bool, price: f64) -> InstanceOffer {
        InstanceOffer {
            provider: "aws".to_string(),
            instance_type: instance_type.to_string(),
            region: "us-east-1".to_string(),
            architecture: Architecture::X86_64,
            vcpu_count: 4,
            memory_gib: 16.0,
            price,
            is_spot,
            spot_availability_zone: None,
            observed_at: Utc::now(),
            extra: Default::default(),
        }
    }

    #[test]
    fn derives_price_metrics() {
        let rows = compose(
            &[result("m5.xlarge", 4, Some(100.0))],
            &[offer("m5.xlarge", false, 2.0)],
            &ComposeOptions::default(),
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].score_per_price, Some(50.0));
        assert_eq!(rows[0].score_per_price_per_cpu, Some(12.5));
    }

    #[test]
    fn unmatched_and_free_rows_have_no_metrics() {
        let rows = compose(
            &[result("m5.xlarge", 4, Some(100.0)), result("t3.nano", 1, Some(5.0))],
            &[offer("m5.xlarge", false, 0.0)],
            &ComposeOptions::default(),
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].price, Some(0.0));
        assert_eq!(rows[0].score_per_price, None);
        assert_eq!(rows[1].price, None);
        assert_eq!(rows[1].region, None);
        assert_eq!(rows[1].score_per_price_per_cpu, None);
    }

    #[test]
    fn keeps_max_cpu_rows_only() {
        let perf = [
            result("m5.xlarge", 1, Some(25.0)),
            result("m5.xlarge", 4, Some(100.0)),
            result("m5.xlarge", 2, Some(50.0)),
        ];
        let options = ComposeOptions::builder().max_cpus_only(true).build();
        let rows = compose(&perf, &[offer("m5.xlarge", false, 2.0)], &options);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].result.cpu_count, 4);
    }

    #[test]
    fn spot_rows_use_block_price() {
        let mut spot = offer("m5.xlarge", true, 1.0);
        spot.extra.insert("price_6h".to_string(), serde_json::json!(2.0));
        let mut on_demand = offer("m5.xlarge", false, 4.0);
        on_demand.extra.insert("price_6h".to_string(), serde_json::json!(8.0));
        let options = ComposeOptions::builder().block_duration_hours(6).build();

        let rows = compose(&[result("m5.xlarge", 4, Some(100.0))], &[spot, on_demand], &options);
        let prices: Vec<_> = rows.iter().map(|r| (r.spot, r.price)).collect();
        assert_eq!(prices, vec![(Some(true), Some(2.0)), (Some(false), Some(4.0))]);
    }
}
