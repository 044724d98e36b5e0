// SPDX-License-Identifier: Apache-2.0

//! Per-test lifecycle controller. A [`Suite`] owns named test cases and
//! guarantees each one a freshly deployed set of contracts: the deployment
//! call fully resolves (or fails) strictly before the case body starts, the
//! resulting handles are moved into that body and nowhere else, and a
//! failed deployment marks only its own case; later cases still get their
//! own fresh attempt. There are no retries, so a flaky deployment stays
//! visible instead of being masked.

use crate::assertions;
use crate::chain::TestEnv;
use crate::config::ConfigError;
use crate::contract::ContractHandle;
use crate::deploy::{DeployError, DeployedContracts, Deployer};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};

/// What a test case body reports back.
pub type CaseResult = Result<(), CaseFailure>;

/// A test failure raised inside a case body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaseFailure {
    #[error("{0}")]
    Failed(String),

    #[error("test case panicked: {0}")]
    Panicked(String),
}

impl CaseFailure {
    pub fn msg(msg: impl Into<String>) -> Self {
        CaseFailure::Failed(msg.into())
    }
}

/// Everything a test case body owns: the freshly deployed handles and the
/// session they live in. Moved into the body; dropped when the body ends.
pub struct TestContext {
    pub contracts: DeployedContracts,
    pub env: TestEnv,
}

impl TestContext {
    /// The Utility contract handle for this case.
    pub fn utility(&self) -> &ContractHandle {
        self.contracts.utility()
    }
}

type CaseBody = Box<dyn Fn(TestContext) -> BoxFuture<'static, CaseResult> + Send>;

struct TestCase {
    name: String,
    body: CaseBody,
}

/// How one test case ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseOutcome {
    Passed,
    /// The body ran and failed.
    Failed(CaseFailure),
    /// Deployment failed or timed out; the body never ran.
    SetupFailed(DeployError),
}

impl CaseOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, CaseOutcome::Passed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseReport {
    pub name: String,
    pub outcome: CaseOutcome,
}

/// Per-case outcomes for one suite run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteReport {
    pub suite: String,
    pub cases: Vec<CaseReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.cases.iter().filter(|c| c.outcome.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.cases.len() - self.passed()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    pub fn outcome_of(&self, name: &str) -> Option<&CaseOutcome> {
        self.cases.iter().find(|c| c.name == name).map(|c| &c.outcome)
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "suite '{}': {} passed, {} failed",
            self.suite,
            self.passed(),
            self.failed()
        )?;
        for case in &self.cases {
            match &case.outcome {
                CaseOutcome::Passed => writeln!(f, "  pass {}", case.name)?,
                CaseOutcome::Failed(e) => writeln!(f, "  FAIL {}: {e}", case.name)?,
                CaseOutcome::SetupFailed(e) => writeln!(f, "  FAIL {} (setup): {e}", case.name)?,
            }
        }
        Ok(())
    }
}

/// A named test suite with a fresh deployment before every case.
pub struct Suite<D> {
    name: String,
    deployer: D,
    cases: Vec<TestCase>,
    deploy_timeout: Option<Duration>,
}

impl<D: Deployer> Suite<D> {
    pub fn new(name: impl Into<String>, deployer: D) -> Self {
        Suite { name: name.into(), deployer, cases: Vec::new(), deploy_timeout: None }
    }

    /// Overrides the configured deployment timeout for this suite.
    pub fn with_deploy_timeout(mut self, dur: Duration) -> Self {
        self.deploy_timeout = Some(dur);
        self
    }

    /// Registers a test case. Cases run in declaration order.
    pub fn case<F, Fut>(mut self, name: impl Into<String>, body: F) -> Self
    where
        F: Fn(TestContext) -> Fut + Send + 'static,
        Fut: Future<Output = CaseResult> + Send + 'static,
    {
        self.cases.push(TestCase {
            name: name.into(),
            body: Box::new(move |cx| body(cx).boxed()),
        });
        self
    }

    /// Runs every case, deploying fresh contracts before each one. A suite
    /// with no cases is valid and reports success.
    ///
    /// The only fatal error is a configuration error from installing the
    /// assertion extensions; everything else is recorded per case.
    pub async fn run(mut self, env: &TestEnv) -> Result<SuiteReport, ConfigError> {
        let ext = assertions::install()?;
        let deploy_timeout = self.deploy_timeout.unwrap_or_else(|| ext.deploy_timeout());

        info!(suite = %self.name, cases = self.cases.len(), "running suite");
        let mut report = SuiteReport { suite: self.name.clone(), cases: Vec::new() };

        for case in &self.cases {
            let outcome = run_case(&mut self.deployer, env, case, deploy_timeout).await;
            match &outcome {
                CaseOutcome::Passed => info!(case = %case.name, "passed"),
                CaseOutcome::Failed(e) => warn!(case = %case.name, error = %e, "failed"),
                CaseOutcome::SetupFailed(e) => {
                    warn!(case = %case.name, error = %e, "deployment failed")
                }
            }
            report.cases.push(CaseReport { name: case.name.clone(), outcome });
        }

        Ok(report)
    }
}

async fn run_case<D: Deployer>(
    deployer: &mut D,
    env: &TestEnv,
    case: &TestCase,
    deploy_timeout: Duration,
) -> CaseOutcome {
    // the hook: deployment fully settles before the body is even created
    let contracts = match timeout(deploy_timeout, deployer.deploy(env)).await {
        Err(_) => return CaseOutcome::SetupFailed(DeployError::TimedOut(deploy_timeout)),
        Ok(Err(e)) => return CaseOutcome::SetupFailed(e),
        Ok(Ok(contracts)) => contracts,
    };

    let cx = TestContext { contracts, env: env.clone() };
    match AssertUnwindSafe((case.body)(cx)).catch_unwind().await {
        Ok(Ok(())) => CaseOutcome::Passed,
        Ok(Err(failure)) => CaseOutcome::Failed(failure),
        Err(payload) => CaseOutcome::Failed(CaseFailure::Panicked(panic_message(payload))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
