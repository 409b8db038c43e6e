use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use domain_benchmark::{
    mock::{
        MockBenchmarkRunnerService, MockComputeProvider, MockInstanceAcquisitionService,
        MockRemoteSession, MockSessionBootstrapService, MockSessionConnector,
    },
    model::{
        entity::{AcquiredInstance, BenchmarkDefinition, BenchmarkResult, InstanceOffer},
        vo::{
            AcquisitionOutcome, Architecture, BenchmarkTarget, BenchmarkTask, CommandOutput,
            InstanceDescription, InstanceState, LaunchedInstance, ProviderErrorCategory,
            SkipReason, Tag,
        },
    },
    service::{BenchmarkRunnerService, FleetService, RemoteSession},
};
use indoc::indoc;
use service_benchmark::{
    application_tag, BenchmarkRunnerServiceImpl, FleetServiceImpl, InstanceAcquisitionServiceImpl,
    SessionBootstrapServiceImpl,
};

fn offer(instance_type: &str, vcpu_count: u32) -> InstanceOffer {
    InstanceOffer {
        provider: "aws".to_string(),
        instance_type: instance_type.to_string(),
        region: "us-east-1".to_string(),
        architecture: Architecture::X86_64,
        vcpu_count,
        memory_gib: 8.0,
        price: 0.2,
        is_spot: false,
        spot_availability_zone: None,
        observed_at: Utc::now(),
        extra: Default::default(),
    }
}

fn stress_ng() -> BenchmarkDefinition {
    serde_yaml::from_str(indoc! {r#"
        id: sng_matrixprod
        name: stress-ng matrix product
        program: stress-ng
        images:
          x86_64: brafsn/stress-ng-x86_64
          arm64: brafsn/stress-ng-arm64
        cmd: "--matrix {{numcpu}} --matrix-method prod -t 10 --metrics-brief"
        cpus: [1, 2]
        iterations: 2
    "#})
    .unwrap()
}

fn output(exit_status: i32, stdout: &str) -> anyhow::Result<CommandOutput> {
    Ok(CommandOutput {
        exit_status: Some(exit_status),
        stdout: stdout.to_string(),
        ..Default::default()
    })
}

fn scripted_session(mut scores: Vec<&'static str>) -> Arc<dyn RemoteSession> {
    scores.reverse();
    let mut session = MockRemoteSession::new();
    session.expect_write_file().returning(|_, _, _| Ok(()));
    session
        .expect_exec()
        .withf(|command, _| command.contains("docker run"))
        .returning(move |_, _| match scores.pop() {
            Some(score) => output(0, score),
            None => output(1, ""),
        });
    session.expect_exec().returning(|_, _| output(0, ""));
    Arc::new(session)
}

fn running_provider(terminated: Arc<Mutex<Vec<String>>>) -> MockComputeProvider {
    let mut provider = MockComputeProvider::new();
    provider
        .expect_latest_image()
        .returning(|_| Ok("ami-0123".to_string()));
    provider.expect_run_instance().returning(|spec| {
        Ok(LaunchedInstance {
            instance_id: format!("i-{}", spec.instance_type),
            private_address: Some("10.0.0.2".to_string()),
        })
    });
    provider.expect_describe_instance().returning(|id| {
        Ok(InstanceDescription {
            instance_id: id.to_string(),
            state: InstanceState::Running,
            private_address: Some("10.0.0.2".to_string()),
            tags: vec![application_tag()],
        })
    });
    provider.expect_terminate_instance().returning(move |id| {
        terminated.lock().unwrap().push(id.to_string());
        Ok(())
    });
    provider
}

#[tokio::test(start_paused = true)]
async fn end_to_end_aggregates_per_cpu_count() {
    let terminated = Arc::new(Mutex::new(vec![]));
    let provider: Arc<MockComputeProvider> = Arc::new(running_provider(terminated.clone()));

    let mut connector = MockSessionConnector::new();
    connector
        .expect_connect()
        .times(1)
        .returning(|_| Ok(scripted_session(vec!["10", "20", "30", "not a number"])));

    let fleet = FleetServiceImpl::builder()
        .provider(provider.clone())
        .acquisition(Arc::new(
            InstanceAcquisitionServiceImpl::builder()
                .provider(provider.clone())
                .build(),
        ))
        .bootstrap(Arc::new(
            SessionBootstrapServiceImpl::builder()
                .provider(provider.clone())
                .connector(Arc::new(connector))
                .build(),
        ))
        .runner(Arc::new(BenchmarkRunnerServiceImpl::builder().build()))
        .tags(vec![Tag::new("Owner", "perf")])
        .build();

    let report = fleet
        .run(vec![BenchmarkTask {
            offer: offer("x.large", 2),
            benchmarks: vec![stress_ng()],
        }])
        .await;

    assert!(!report.fatal);
    assert!(report.skipped.is_empty());
    let scores: Vec<_> = report
        .results
        .iter()
        .map(|r| (r.instance_type.as_str(), r.cpu_count, r.score))
        .collect();
    assert_eq!(
        scores,
        vec![("x.large", 1, Some(20.0)), ("x.large", 2, Some(30.0))]
    );
    assert_eq!(report.results[0].benchmark_name.as_deref(), Some("stress-ng matrix product"));
    assert!(report.results[0]
        .command
        .starts_with("docker run --rm --network none brafsn/stress-ng-x86_64 --matrix 1"));
    assert_eq!(*terminated.lock().unwrap(), vec!["i-x.large".to_string()]);
}

fn acquired(instance_type: &str) -> AcquisitionOutcome {
    AcquisitionOutcome::Acquired(AcquiredInstance {
        instance_id: format!("i-{instance_type}"),
        private_address: Some("10.0.0.3".to_string()),
        instance_type: instance_type.to_string(),
        architecture: Architecture::X86_64,
        spot_price: Some(0.2),
    })
}

fn fleet_with(
    provider: MockComputeProvider,
    acquisition: MockInstanceAcquisitionService,
    bootstrap: MockSessionBootstrapService,
    runner: Arc<dyn BenchmarkRunnerService>,
) -> FleetServiceImpl {
    FleetServiceImpl::builder()
        .provider(Arc::new(provider))
        .acquisition(Arc::new(acquisition))
        .bootstrap(Arc::new(bootstrap))
        .runner(runner)
        .build()
}

#[tokio::test(start_paused = true)]
async fn instances_are_terminated_on_every_exit_path() {
    let terminated = Arc::new(Mutex::new(vec![]));
    let provider = running_provider(terminated.clone());

    let mut acquisition = MockInstanceAcquisitionService::new();
    acquisition
        .expect_acquire()
        .returning(|request| acquired(&request.instance_type));

    let mut bootstrap = MockSessionBootstrapService::new();
    bootstrap.expect_open().returning(|instance| {
        if instance.instance_type == "no.session" {
            anyhow::bail!("connection refused")
        }
        let session: Arc<dyn RemoteSession> = Arc::new(MockRemoteSession::new());
        Ok(session)
    });

    let fleet = fleet_with(provider, acquisition, bootstrap, Arc::new(PanickyRunner));
    let report = fleet
        .run(vec![
            BenchmarkTask {
                offer: offer("no.session", 2),
                benchmarks: vec![stress_ng()],
            },
            BenchmarkTask {
                offer: offer("panics.large", 2),
                benchmarks: vec![stress_ng()],
            },
            BenchmarkTask {
                offer: offer("fine.large", 2),
                benchmarks: vec![stress_ng()],
            },
        ])
        .await;

    let mut terminated = terminated.lock().unwrap().clone();
    terminated.sort();
    assert_eq!(
        terminated,
        vec!["i-fine.large", "i-no.session", "i-panics.large"]
    );
    assert_eq!(
        report.skipped,
        vec![
            ("no.session".to_string(), SkipReason::NoSession),
            ("panics.large".to_string(), SkipReason::Crashed),
        ]
    );
    assert!(!report.fatal);
}

#[tokio::test(start_paused = true)]
async fn fatal_acquisition_marks_the_report() {
    let mut provider = MockComputeProvider::new();
    provider
        .expect_latest_image()
        .returning(|_| Ok("ami-0123".to_string()));
    provider.expect_terminate_instance().never();

    let mut acquisition = MockInstanceAcquisitionService::new();
    acquisition
        .expect_acquire()
        .returning(|_| AcquisitionOutcome::Abandoned {
            category: ProviderErrorCategory::MissingParameter,
            fatal: true,
        });

    let fleet = fleet_with(
        provider,
        acquisition,
        MockSessionBootstrapService::new(),
        Arc::new(MockBenchmarkRunnerService::new()),
    );
    let report = fleet
        .run(vec![BenchmarkTask {
            offer: offer("m5.large", 2),
            benchmarks: vec![stress_ng()],
        }])
        .await;
    assert!(report.fatal);
    assert_eq!(
        report.skipped,
        vec![("m5.large".to_string(), SkipReason::NotAcquired)]
    );
}

/// Panics on one instance type.
struct PanickyRunner;

#[async_trait]
impl BenchmarkRunnerService for PanickyRunner {
    async fn run(
        &self,
        _session: Arc<dyn RemoteSession>,
        target: &BenchmarkTarget,
        _definitions: &[BenchmarkDefinition],
    ) -> Vec<BenchmarkResult> {
        if target.instance_type == "panics.large" {
            panic!("runner blew up");
        }
        vec![]
    }
}

/// Records how many runs overlap.
#[derive(Default)]
struct SlowRunner {
    running: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl BenchmarkRunnerService for SlowRunner {
    async fn run(
        &self,
        _session: Arc<dyn RemoteSession>,
        target: &BenchmarkTarget,
        _definitions: &[BenchmarkDefinition],
    ) -> Vec<BenchmarkResult> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        vec![BenchmarkResult {
            provider: target.provider.clone(),
            instance_type: target.instance_type.clone(),
            benchmark_id: "sng_zlib".to_string(),
            benchmark_name: None,
            program: None,
            cpu_count: 1,
            score: Some(1.0),
            command: String::default(),
            observed_at: Utc::now(),
        }]
    }
}

#[tokio::test(start_paused = true)]
async fn worker_pool_is_bounded() {
    let terminated = Arc::new(Mutex::new(vec![]));
    let provider = running_provider(terminated.clone());

    let mut acquisition = MockInstanceAcquisitionService::new();
    acquisition
        .expect_acquire()
        .returning(|request| acquired(&request.instance_type));
    let mut bootstrap = MockSessionBootstrapService::new();
    bootstrap.expect_open().returning(|_| {
        let session: Arc<dyn RemoteSession> = Arc::new(MockRemoteSession::new());
        Ok(session)
    });
    let runner = Arc::new(SlowRunner::default());

    let fleet = fleet_with(provider, acquisition, bootstrap, runner.clone());
    let tasks = (0..10)
        .map(|i| BenchmarkTask {
            offer: offer(&format!("m5.{i}xlarge"), 4),
            benchmarks: vec![stress_ng()],
        })
        .collect();
    let report = fleet.run(tasks).await;

    assert_eq!(report.results.len(), 10);
    assert_eq!(runner.peak.load(Ordering::SeqCst), 4);
    assert_eq!(terminated.lock().unwrap().len(), 10);
}

#[tokio::test]
async fn sweep_only_terminates_tagged_instances() {
    let mut provider = MockComputeProvider::new();
    provider.expect_list_tagged_instances().returning(|_| {
        Ok(vec![
            InstanceDescription {
                instance_id: "i-ours".to_string(),
                state: InstanceState::Running,
                private_address: None,
                tags: vec![Tag::new("Owner", "perf"), application_tag()],
            },
            InstanceDescription {
                instance_id: "i-theirs".to_string(),
                state: InstanceState::Running,
                private_address: None,
                tags: vec![Tag::new("Application", "billing")],
            },
        ])
    });
    provider
        .expect_terminate_instance()
        .withf(|id| id == "i-ours")
        .times(1)
        .returning(|_| Ok(()));

    let fleet = fleet_with(
        provider,
        MockInstanceAcquisitionService::new(),
        MockSessionBootstrapService::new(),
        Arc::new(MockBenchmarkRunnerService::new()),
    );
    assert_eq!(fleet.sweep().await.unwrap(), vec!["i-ours".to_string()]);
}
