use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use domain_benchmark::{
    model::{
        entity::AcquiredInstance,
        vo::{
            classify, is_burstable, AcquisitionOutcome, AcquisitionRequest, LaunchError,
            LaunchSpec, MarketOption, ProviderErrorCategory, Tag,
        },
    },
    service::{ComputeProvider, InstanceAcquisitionService},
};
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

/// The parts of a launch request that don't vary per instance type.
#[derive(Clone, Debug, typed_builder::TypedBuilder)]
pub struct LaunchTemplate {
    #[builder(default = "batch".to_string(), setter(into))]
    key_name: String,
    #[builder(default = vec!["tech-ssh".to_string()])]
    security_groups: Vec<String>,
    /// Schedules a shutdown so a leaked instance stops billing on its own.
    #[builder(default = "#!/bin/sh\nshutdown +120".to_string(), setter(into))]
    user_data: String,
    #[builder(default = crate::application_tag())]
    application_tag: Tag,
}

impl Default for LaunchTemplate {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(typed_builder::TypedBuilder)]
pub struct InstanceAcquisitionServiceImpl {
    provider: Arc<dyn ComputeProvider>,
    #[builder(default)]
    template: LaunchTemplate,
    #[builder(default = 16)]
    retry_budget: u32,
    #[builder(default = 1.2)]
    backoff_base: f64,
}

static SPOT_PRICES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+\.[0-9]+").unwrap());

/// Pulls the live market price out of a `SpotMaxPriceTooLow` message, which
/// states the requested ceiling first and the current price second.
fn live_spot_price(message: &str) -> Option<f64> {
    SPOT_PRICES
        .find_iter(message)
        .nth(1)
        .and_then(|m| m.as_str().parse().ok())
}

#[async_trait]
impl InstanceAcquisitionService for InstanceAcquisitionServiceImpl {
    async fn acquire(&self, request: &AcquisitionRequest) -> AcquisitionOutcome {
        let mut market = MarketOption::Spot {
            max_price: request.max_spot_price,
        };
        let mut unlimited_credits = is_burstable(&request.instance_type);
        // One token per market and credit setting, so a retried launch that
        // did reach the provider returns the instance it already started.
        let mut client_token = Uuid::new_v4().to_string();
        let mut attempt = 0;

        while attempt < self.retry_budget {
            let spec = self.launch_spec(request, market, unlimited_credits, &client_token);
            let error = match self.provider.run_instance(&spec).await {
                Ok(launched) => {
                    tracing::info!(
                        "Acquired {} {} as {}.",
                        if market.is_spot() { "spot" } else { "on-demand" },
                        request.instance_type,
                        launched.instance_id
                    );
                    return AcquisitionOutcome::Acquired(AcquiredInstance {
                        instance_id: launched.instance_id,
                        private_address: launched.private_address,
                        instance_type: request.instance_type.clone(),
                        architecture: request.architecture,
                        spot_price: match market {
                            MarketOption::Spot { max_price } => Some(max_price),
                            MarketOption::OnDemand => None,
                        },
                    });
                }
                Err(e) => e,
            };
            let classification = classify(&error);

            match classification.category {
                ProviderErrorCategory::CreditSpecificationUnsupported => {
                    if unlimited_credits {
                        tracing::warn!(
                            "{} doesn't support unlimited credits, retrying without.",
                            request.instance_type
                        );
                        unlimited_credits = false;
                        client_token = Uuid::new_v4().to_string();
                        continue;
                    }
                    tracing::error!("Giving up on {}: {error}", request.instance_type);
                    return AcquisitionOutcome::Abandoned {
                        category: classification.category,
                        fatal: false,
                    };
                }
                ProviderErrorCategory::InvalidParameter => {
                    if attempt == 0 {
                        tracing::warn!(
                            "Invalid parameter for {}, trying once more on-demand: {error}",
                            request.instance_type
                        );
                        market = MarketOption::OnDemand;
                        client_token = Uuid::new_v4().to_string();
                        attempt += 1;
                        continue;
                    }
                }
                ProviderErrorCategory::SpotPriceTooLow => {
                    if let LaunchError::Provider(e) = &error {
                        tracing::info!(
                            "Spot ceiling {} is below the market price {:?} for {}.",
                            request.max_spot_price,
                            live_spot_price(&e.message),
                            request.instance_type
                        );
                    }
                }
                _ => {}
            }

            if classification.should_fallback && market.is_spot() {
                tracing::info!(
                    "Falling back to on-demand for {}: {error}",
                    request.instance_type
                );
                market = MarketOption::OnDemand;
                client_token = Uuid::new_v4().to_string();
                attempt = 0;
                continue;
            }
            if !classification.should_retry {
                tracing::error!("Giving up on {}: {error}", request.instance_type);
                return AcquisitionOutcome::Abandoned {
                    category: classification.category,
                    fatal: classification.is_fatal,
                };
            }

            let pause = self.backoff(attempt);
            tracing::info!(
                "Retrying {} in {:.1}s, try #{attempt}: {error}",
                request.instance_type,
                pause.as_secs_f64()
            );
            tokio::time::sleep(pause).await;
            attempt += 1;
        }

        tracing::error!(
            "Couldn't acquire {} within {} attempts.",
            request.instance_type,
            self.retry_budget
        );
        AcquisitionOutcome::Exhausted {
            attempts: self.retry_budget,
        }
    }
}

impl InstanceAcquisitionServiceImpl {
    fn launch_spec(
        &self,
        request: &AcquisitionRequest,
        market: MarketOption,
        unlimited_credits: bool,
        client_token: &str,
    ) -> LaunchSpec {
        let mut tags = request.tags.clone();
        if !tags.contains(&self.template.application_tag) {
            tags.push(self.template.application_tag.clone());
        }
        LaunchSpec {
            instance_type: request.instance_type.clone(),
            image_id: request.image_id.clone(),
            key_name: self.template.key_name.clone(),
            security_groups: self.template.security_groups.clone(),
            user_data: self.template.user_data.clone(),
            tags,
            unlimited_credits,
            market,
            client_token: client_token.to_string(),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_secs_f64(self.backoff_base.powi(attempt as i32))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use domain_benchmark::{
        mock::MockComputeProvider,
        model::vo::{Architecture, LaunchedInstance, ProviderError},
    };

    use super::*;

    fn request(instance_type: &str) -> AcquisitionRequest {
        AcquisitionRequest {
            instance_type: instance_type.to_string(),
            architecture: Architecture::X86_64,
            image_id: "ami-1".to_string(),
            max_spot_price: 0.5,
            tags: vec![Tag::new("Owner", "perf")],
        }
    }

    fn launched(id: &str) -> Result<LaunchedInstance, LaunchError> {
        Ok(LaunchedInstance {
            instance_id: id.to_string(),
            private_address: Some("10.0.0.1".to_string()),
        })
    }

    fn refused(code: &str, message: &str) -> Result<LaunchedInstance, LaunchError> {
        Err(ProviderError::new(code, message).into())
    }

    fn service(provider: MockComputeProvider) -> InstanceAcquisitionServiceImpl {
        InstanceAcquisitionServiceImpl::builder()
            .provider(Arc::new(provider))
            .build()
    }

    #[test]
    fn extracts_live_spot_price() {
        let message = "Your Spot request price of 0.0104 is lower than the minimum required Spot request fulfillment price of 0.0116.";
        assert_eq!(live_spot_price(message), Some(0.0116));
        assert_eq!(live_spot_price("no numbers"), None);
    }

    #[test]
    fn backoff_grows_geometrically() {
        let service = service(MockComputeProvider::new());
        assert_eq!(service.backoff(0), Duration::from_secs(1));
        assert!((service.backoff(2).as_secs_f64() - 1.44).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn first_spot_success_keeps_ceiling() {
        let mut provider = MockComputeProvider::new();
        provider
            .expect_run_instance()
            .withf(|spec| {
                spec.market == MarketOption::Spot { max_price: 0.5 }
                    && spec.tags.contains(&crate::application_tag())
                    && spec.tags.contains(&Tag::new("Owner", "perf"))
                    && !spec.unlimited_credits
                    && spec.user_data == "#!/bin/sh\nshutdown +120"
            })
            .times(1)
            .returning(|_| launched("i-1"));

        let outcome = service(provider).acquire(&request("m5.large")).await;
        let AcquisitionOutcome::Acquired(instance) = outcome else {
            panic!("expected an instance, got {outcome:?}");
        };
        assert_eq!(instance.instance_id, "i-1");
        assert_eq!(instance.spot_price, Some(0.5));
    }

    #[tokio::test(start_paused = true)]
    async fn capacity_shortage_falls_back_to_on_demand() {
        let markets = Arc::new(Mutex::new(Vec::new()));
        let seen = markets.clone();
        let mut provider = MockComputeProvider::new();
        provider
            .expect_run_instance()
            .times(2)
            .returning(move |spec| {
                seen.lock().unwrap().push(spec.market);
                if spec.market.is_spot() {
                    refused("InsufficientInstanceCapacity", "no capacity")
                } else {
                    launched("i-2")
                }
            });

        let outcome = service(provider).acquire(&request("c5.large")).await;
        let AcquisitionOutcome::Acquired(instance) = outcome else {
            panic!("expected an instance, got {outcome:?}");
        };
        assert!(!instance.is_spot());
        assert_eq!(
            *markets.lock().unwrap(),
            vec![MarketOption::Spot { max_price: 0.5 }, MarketOption::OnDemand]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn burstable_drops_credits_without_counting() {
        let mut seq = mockall::Sequence::new();
        let mut provider = MockComputeProvider::new();
        provider
            .expect_run_instance()
            .withf(|spec| spec.unlimited_credits)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| refused("InstanceCreditSpecification.NotSupported", "nope"));
        provider
            .expect_run_instance()
            .withf(|spec| !spec.unlimited_credits && spec.market.is_spot())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| launched("i-3"));

        let outcome = service(provider).acquire(&request("t3.micro")).await;
        assert!(matches!(outcome, AcquisitionOutcome::Acquired(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_parameter_is_fatal() {
        let mut provider = MockComputeProvider::new();
        provider
            .expect_run_instance()
            .times(1)
            .returning(|_| refused("MissingParameter", "ImageId"));

        let outcome = service(provider).acquire(&request("m5.large")).await;
        assert_eq!(
            outcome,
            AcquisitionOutcome::Abandoned {
                category: ProviderErrorCategory::MissingParameter,
                fatal: true,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_type_is_skipped_quietly() {
        let mut provider = MockComputeProvider::new();
        provider
            .expect_run_instance()
            .times(1)
            .returning(|_| refused("Unsupported", "not in this zone"));

        let outcome = service(provider).acquire(&request("x1.32xlarge")).await;
        assert_eq!(
            outcome,
            AcquisitionOutcome::Abandoned {
                category: ProviderErrorCategory::Unsupported,
                fatal: false,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_parameter_gets_one_on_demand_try() {
        let mut provider = MockComputeProvider::new();
        provider
            .expect_run_instance()
            .times(2)
            .returning(|_| refused("InvalidParameterValue", "bad"));

        let outcome = service(provider).acquire(&request("m5.large")).await;
        assert_eq!(
            outcome,
            AcquisitionOutcome::Abandoned {
                category: ProviderErrorCategory::InvalidParameter,
                fatal: true,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn throttling_exhausts_retry_budget() {
        let mut provider = MockComputeProvider::new();
        provider
            .expect_run_instance()
            .times(3)
            .returning(|_| refused("RequestLimitExceeded", "slow down"));

        let service = InstanceAcquisitionServiceImpl::builder()
            .provider(Arc::new(provider))
            .retry_budget(3)
            .build();
        let outcome = service.acquire(&request("m5.large")).await;
        assert_eq!(outcome, AcquisitionOutcome::Exhausted { attempts: 3 });
    }

    /// Records the market and client token of every launch request.
    fn recording(
        mut respond: impl FnMut(&LaunchSpec) -> Result<LaunchedInstance, LaunchError> + Send + 'static,
    ) -> (MockComputeProvider, Arc<Mutex<Vec<(MarketOption, String)>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = calls.clone();
        let mut provider = MockComputeProvider::new();
        provider.expect_run_instance().returning(move |spec| {
            seen.lock().unwrap().push((spec.market, spec.client_token.clone()));
            respond(spec)
        });
        (provider, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn transport_retries_reuse_the_client_token() {
        let mut failures = 2;
        let (provider, calls) = recording(move |_: &LaunchSpec| {
            if failures > 0 {
                failures -= 1;
                return Err(LaunchError::Transport(anyhow::anyhow!("aws timed out")));
            }
            launched("i-4")
        });

        let outcome = service(provider).acquire(&request("m5.large")).await;
        assert!(matches!(outcome, AcquisitionOutcome::Acquired(_)));
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|(market, token)| market.is_spot() && *token == calls[0].1));
    }

    #[tokio::test(start_paused = true)]
    async fn on_demand_capacity_shortage_backs_off_in_place() {
        let (provider, calls) = recording({
            let mut on_demand_tries = 0;
            move |spec: &LaunchSpec| {
                if spec.market.is_spot() {
                    return refused("InsufficientInstanceCapacity", "no spot capacity");
                }
                on_demand_tries += 1;
                if on_demand_tries == 1 {
                    refused("InsufficientInstanceCapacity", "no capacity")
                } else {
                    launched("i-5")
                }
            }
        });

        let start = tokio::time::Instant::now();
        let outcome = service(provider).acquire(&request("c5.large")).await;
        let AcquisitionOutcome::Acquired(instance) = outcome else {
            panic!("expected an instance, got {outcome:?}");
        };
        assert_eq!(instance.spot_price, None);
        // Only the on-demand retry waited, with the first backoff step.
        assert!(start.elapsed() >= Duration::from_secs(1));
        assert!(start.elapsed() < Duration::from_millis(1100));

        let calls = calls.lock().unwrap();
        let markets: Vec<_> = calls.iter().map(|(market, _)| *market).collect();
        assert_eq!(
            markets,
            vec![
                MarketOption::Spot { max_price: 0.5 },
                MarketOption::OnDemand,
                MarketOption::OnDemand
            ]
        );
        assert_ne!(calls[0].1, calls[1].1);
        assert_eq!(calls[1].1, calls[2].1);
    }

    #[tokio::test(start_paused = true)]
    async fn spot_price_too_low_switches_market_and_resets_attempts() {
        let (provider, calls) = recording({
            let mut tries = 0;
            move |spec: &LaunchSpec| {
                tries += 1;
                match (spec.market.is_spot(), tries) {
                    (true, 1 | 2) | (false, 4 | 5) => refused("RequestLimitExceeded", "slow down"),
                    (true, _) => refused(
                        "SpotMaxPriceTooLow",
                        "Your Spot request price of 0.5 is lower than the minimum required Spot request fulfillment price of 0.61.",
                    ),
                    (false, _) => launched("i-6"),
                }
            }
        });

        let service = InstanceAcquisitionServiceImpl::builder()
            .provider(Arc::new(provider))
            .retry_budget(3)
            .build();
        let start = tokio::time::Instant::now();
        let outcome = service.acquire(&request("m5.large")).await;
        let AcquisitionOutcome::Acquired(instance) = outcome else {
            panic!("expected an instance, got {outcome:?}");
        };
        assert_eq!(instance.instance_id, "i-6");
        // Backoff restarted at one second after the switch: 1 + 1.2 twice.
        assert!(start.elapsed() >= Duration::from_millis(4390));
        assert!(start.elapsed() < Duration::from_millis(4500));

        let markets: Vec<_> = calls.lock().unwrap().iter().map(|(market, _)| *market).collect();
        let spot = MarketOption::Spot { max_price: 0.5 };
        assert_eq!(
            markets,
            vec![
                spot,
                spot,
                spot,
                MarketOption::OnDemand,
                MarketOption::OnDemand,
                MarketOption::OnDemand
            ]
        );
    }
}
