// SPDX-License-Identifier: Apache-2.0

//! Lifecycle properties of the suite controller: one fresh deployment per
//! case, strict deploy-before-body ordering, and failure containment.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use utility_testkit::{
    assertions, assert_big_eq, fixtures, CallError, CaseFailure, CaseOutcome, ContractHandle,
    DeployError, DeployedContracts, Deployer, Suite, TestEnv, UtilityDeployer,
};

static TRACING: Lazy<()> = Lazy::new(|| {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
});

fn setup() -> TestEnv {
    Lazy::force(&TRACING);
    assertions::install().expect("harness configuration must be valid");
    TestEnv::new().expect("harness configuration must be valid")
}

/// Wraps a deployer and appends a line to a shared log on every call.
struct Recording<D> {
    inner: D,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl<D: Deployer> Deployer for Recording<D> {
    async fn deploy(&mut self, env: &TestEnv) -> Result<DeployedContracts, DeployError> {
        self.log.lock().unwrap().push("deploy".to_string());
        self.inner.deploy(env).await
    }
}

/// Fails the first `failures_left` deployment calls, then delegates.
struct Flaky {
    inner: UtilityDeployer,
    failures_left: u32,
}

#[async_trait]
impl Deployer for Flaky {
    async fn deploy(&mut self, env: &TestEnv) -> Result<DeployedContracts, DeployError> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(DeployError::Chain("injected chain fault".to_string()));
        }
        self.inner.deploy(env).await
    }
}

/// Stalls the first `delays_left` deployment calls, then delegates.
struct SlowOnce {
    inner: UtilityDeployer,
    delays_left: u32,
    delay: Duration,
}

#[async_trait]
impl Deployer for SlowOnce {
    async fn deploy(&mut self, env: &TestEnv) -> Result<DeployedContracts, DeployError> {
        if self.delays_left > 0 {
            self.delays_left -= 1;
            tokio::time::sleep(self.delay).await;
        }
        self.inner.deploy(env).await
    }
}

#[tokio::test]
async fn each_case_gets_its_own_deployment() {
    let env = setup();
    let log = Arc::new(Mutex::new(Vec::new()));
    let addresses = Arc::new(Mutex::new(Vec::new()));

    let suite = Suite::new(
        "Utility [all features]",
        Recording { inner: UtilityDeployer::new(), log: log.clone() },
    )
    .case("first", {
        let log = log.clone();
        let addresses = addresses.clone();
        move |cx| {
            let log = log.clone();
            let addresses = addresses.clone();
            async move {
                log.lock().unwrap().push("case first".to_string());
                addresses.lock().unwrap().push(cx.utility().address());
                Ok(())
            }
        }
    })
    .case("second", {
        let log = log.clone();
        let addresses = addresses.clone();
        move |cx| {
            let log = log.clone();
            let addresses = addresses.clone();
            async move {
                log.lock().unwrap().push("case second".to_string());
                addresses.lock().unwrap().push(cx.utility().address());
                Ok(())
            }
        }
    });

    let report = suite.run(&env).await.unwrap();

    assert!(report.is_success(), "{report}");
    assert_eq!(env.deployment_count(), 2);

    // two deployment calls, one per case, each producing a distinct handle
    let addresses = addresses.lock().unwrap();
    assert_ne!(addresses[0], addresses[1]);

    // the deployment call fully resolves before its case body starts
    assert_eq!(
        *log.lock().unwrap(),
        vec!["deploy", "case first", "deploy", "case second"]
    );
}

#[tokio::test]
async fn storage_does_not_leak_between_cases() {
    let env = setup();

    let report = Suite::new("Utility [all features]", UtilityDeployer::new())
        .case("writes the supply", |cx| async move {
            let supply = &fixtures().initial_supply;
            assertions::resolves(cx.utility().write("total_supply", supply)).await;
            let held = assertions::resolves(cx.utility().read("total_supply")).await;
            assert_big_eq!(held.unwrap(), supply);
            Ok(())
        })
        .case("sees a clean instance", |cx| async move {
            let held = assertions::resolves(cx.utility().read("total_supply")).await;
            if held.is_some() {
                return Err(CaseFailure::msg("prior case leaked storage into this one"));
            }
            Ok(())
        })
        .run(&env)
        .await
        .unwrap();

    assert!(report.is_success(), "{report}");
}

#[tokio::test]
async fn a_failed_deployment_only_fails_its_own_case() {
    let env = setup();

    let report = Suite::new(
        "Utility [all features]",
        Flaky { inner: UtilityDeployer::new(), failures_left: 1 },
    )
    .case("first", |cx| async move {
        assertions::resolves(cx.utility().read("anything")).await;
        Ok(())
    })
    .case("second", |cx| async move {
        assertions::resolves(cx.utility().read("anything")).await;
        Ok(())
    })
    .run(&env)
    .await
    .unwrap();

    assert_eq!(
        report.outcome_of("first"),
        Some(&CaseOutcome::SetupFailed(DeployError::Chain(
            "injected chain fault".to_string()
        )))
    );
    assert_eq!(report.outcome_of("second"), Some(&CaseOutcome::Passed));

    // the failed attempt never reached the chain
    assert_eq!(env.deployment_count(), 1);
}

#[tokio::test]
async fn a_slow_deployment_times_out_without_blocking_later_cases() {
    let env = setup();

    let report = Suite::new(
        "Utility [all features]",
        SlowOnce {
            inner: UtilityDeployer::new(),
            delays_left: 1,
            delay: Duration::from_millis(200),
        },
    )
    .with_deploy_timeout(Duration::from_millis(50))
    .case("first", |_cx| async { Ok(()) })
    .case("second", |_cx| async { Ok(()) })
    .run(&env)
    .await
    .unwrap();

    assert_eq!(
        report.outcome_of("first"),
        Some(&CaseOutcome::SetupFailed(DeployError::TimedOut(
            Duration::from_millis(50)
        )))
    );
    assert_eq!(report.outcome_of("second"), Some(&CaseOutcome::Passed));
}

#[tokio::test]
async fn assertion_panics_are_recorded_per_case() {
    let env = setup();

    let report = Suite::new("Utility [all features]", UtilityDeployer::new())
        .case("fails", |_cx| async {
            assert_big_eq!(1u8, 2u8);
            Ok(())
        })
        .case("passes", |_cx| async { Ok(()) })
        .run(&env)
        .await
        .unwrap();

    match report.outcome_of("fails") {
        Some(CaseOutcome::Failed(CaseFailure::Panicked(msg))) => {
            assert!(msg.contains("assertion failed"), "{msg}");
        }
        other => panic!("expected a captured panic, got {other:?}"),
    }
    assert_eq!(report.outcome_of("passes"), Some(&CaseOutcome::Passed));
    assert_eq!(report.passed(), 1);
    assert_eq!(report.failed(), 1);
}

#[tokio::test]
async fn an_empty_suite_is_valid() {
    let env = setup();

    let report = Suite::new("Utility [all features]", UtilityDeployer::new())
        .run(&env)
        .await
        .unwrap();

    assert!(report.cases.is_empty());
    assert!(report.is_success());
    assert_eq!(env.deployment_count(), 0);
}

#[tokio::test]
async fn handles_from_earlier_cases_are_stale() {
    let env = setup();
    let stash: Arc<Mutex<Option<ContractHandle>>> = Arc::new(Mutex::new(None));

    let report = Suite::new("Utility [all features]", UtilityDeployer::new())
        .case("stashes its handle", {
            let stash = stash.clone();
            move |cx| {
                let stash = stash.clone();
                async move {
                    stash.lock().unwrap().replace(cx.utility().clone());
                    Ok(())
                }
            }
        })
        .case("cannot reuse it", {
            let stash = stash.clone();
            move |_cx| {
                let stash = stash.clone();
                async move {
                    let old = stash.lock().unwrap().take().unwrap();
                    match old.read("total_supply").await {
                        Err(CallError::StaleHandle { .. }) => Ok(()),
                        other => Err(CaseFailure::msg(format!(
                            "a superseded handle must be rejected, got {other:?}"
                        ))),
                    }
                }
            }
        })
        .run(&env)
        .await
        .unwrap();

    assert!(report.is_success(), "{report}");
}
