// SPDX-License-Identifier: Apache-2.0

//! Deterministic test harness for the Utility contract system.
//!
//! The harness gives every test case an isolated, freshly deployed contract
//! instance: assertion extensions are installed once per process
//! ([`assertions::install`]), fixtures and the arbitrary-precision numeric
//! helper are available at load time, and the per-test lifecycle controller
//! ([`suite::Suite`]) re-runs the deployment orchestrator before every case
//! so no state leaks between runs.

pub mod assertions;
pub mod bignum;
pub mod chain;
pub mod config;
pub mod contract;
pub mod deploy;
pub mod fixtures;
pub mod suite;

pub use bignum::{big, Big, IntoBig, ParseBigError};
pub use chain::{storage_key, Address, CallError, TestEnv, STORAGE_DEPOSIT};
pub use config::{ConfigError, HarnessConfig};
pub use contract::ContractHandle;
pub use deploy::{
    deploy_test_contracts, ContractArtifact, DeployError, DeployedContracts, Deployer,
    UtilityDeployer, UTILITY_CONTRACT, UTILITY_SOURCE,
};
pub use fixtures::{fixtures, Keyring};
pub use suite::{CaseFailure, CaseOutcome, CaseResult, Suite, SuiteReport, TestContext};
