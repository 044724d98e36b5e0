// SPDX-License-Identifier: Apache-2.0

//! Deployment orchestration. [`Deployer`] is the contract the lifecycle
//! controller consumes: an asynchronous operation that, on success, yields a
//! mapping from logical contract names to live handles, freshly deployed.
//! [`UtilityDeployer`] is the default implementation for the Utility
//! contract system; [`deploy_test_contracts`] is its free-function form.

use crate::chain::{keccak256, Address, CallError, TestEnv};
use crate::contract::ContractHandle;
use crate::fixtures::Keyring;
use async_trait::async_trait;
use indexmap::IndexMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// The logical name the Utility contract is registered under.
pub const UTILITY_CONTRACT: &str = "utility_contract";

/// The Utility contract interface, embedded so deployment needs no files on
/// disk. The mock chain client executes storage semantics directly, so the
/// source only needs to name the contract it defines.
pub const UTILITY_SOURCE: &str = r#"
contract Utility {
    mapping(bytes32 => bytes) values;

    function store(bytes32 key, bytes value) public;
    function retrieve(bytes32 key) public view returns (bytes);
    function clear(bytes32 key) public;
}
"#;

/// An error from the deployment orchestrator. The lifecycle controller does
/// not interpret the cause, only propagates it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeployError {
    #[error("compilation failed: {0}")]
    Compile(String),

    #[error("deployment did not complete within {0:?}")]
    TimedOut(Duration),

    #[error("insufficient funds for deployment: {available} available, {required} required")]
    InsufficientFunds { available: u128, required: u128 },

    #[error("chain client fault: {0}")]
    Chain(String),
}

impl From<CallError> for DeployError {
    fn from(e: CallError) -> Self {
        match e {
            CallError::InsufficientFunds { available, required } => {
                DeployError::InsufficientFunds { available, required }
            }
            other => DeployError::Chain(other.to_string()),
        }
    }
}

/// A compiled contract, ready to instantiate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractArtifact {
    pub contract_name: String,
    pub bytecode: Vec<u8>,
    pub code_hash: [u8; 32],
}

impl ContractArtifact {
    /// Compiles `source`, which must define `contract_name`.
    pub fn compile(contract_name: &str, source: &str) -> Result<Self, DeployError> {
        if source.trim().is_empty() {
            return Err(DeployError::Compile("empty contract source".to_string()));
        }
        if !source.contains(&format!("contract {contract_name}")) {
            return Err(DeployError::Compile(format!(
                "source defines no contract '{contract_name}'"
            )));
        }

        let bytecode = source.as_bytes().to_vec();
        let code_hash = keccak256(&bytecode);
        debug!(contract_name, code_hash = %hex::encode(code_hash), "compiled contract");

        Ok(ContractArtifact { contract_name: contract_name.to_string(), bytecode, code_hash })
    }
}

/// The name-to-handle mapping one deployment round produces. Always contains
/// the [`UTILITY_CONTRACT`] entry when produced by [`UtilityDeployer`].
#[derive(Debug, Clone, Default)]
pub struct DeployedContracts {
    contracts: IndexMap<String, ContractHandle>,
}

impl DeployedContracts {
    pub(crate) fn insert(&mut self, name: impl Into<String>, handle: ContractHandle) {
        self.contracts.insert(name.into(), handle);
    }

    pub fn get(&self, name: &str) -> Option<&ContractHandle> {
        self.contracts.get(name)
    }

    /// The Utility contract handle.
    ///
    /// Panics when the orchestrator that produced this mapping broke its
    /// contract and omitted the entry.
    pub fn utility(&self) -> &ContractHandle {
        self.get(UTILITY_CONTRACT)
            .expect("deployment orchestrator did not register the utility contract")
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.contracts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

/// The asynchronous deployment operation the per-test lifecycle controller
/// invokes before every case.
#[async_trait]
pub trait Deployer: Send {
    async fn deploy(&mut self, env: &TestEnv) -> Result<DeployedContracts, DeployError>;
}

/// Default orchestrator: compiles the embedded Utility artifact and
/// instantiates it from a keyring account.
#[derive(Debug, Clone)]
pub struct UtilityDeployer {
    deployer_account: Address,
}

impl UtilityDeployer {
    pub fn new() -> Self {
        Self::from_account(Keyring::Alice.address())
    }

    pub fn from_account(deployer_account: Address) -> Self {
        UtilityDeployer { deployer_account }
    }
}

impl Default for UtilityDeployer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Deployer for UtilityDeployer {
    async fn deploy(&mut self, env: &TestEnv) -> Result<DeployedContracts, DeployError> {
        let generation = env.begin_deployment_round();
        let artifact = ContractArtifact::compile("Utility", UTILITY_SOURCE)?;

        tokio::task::yield_now().await;
        let address = env.instantiate(artifact.code_hash, self.deployer_account)?;
        debug!(%address, generation, "deployed utility contract");

        let handle = ContractHandle::new(
            UTILITY_CONTRACT,
            address,
            artifact.code_hash,
            generation,
            env.clone(),
        );
        let mut deployed = DeployedContracts::default();
        deployed.insert(UTILITY_CONTRACT, handle);
        Ok(deployed)
    }
}

/// Deploys a fresh set of test contracts, the call to make at the start of
/// every test case.
pub async fn deploy_test_contracts(env: &TestEnv) -> Result<DeployedContracts, DeployError> {
    let mut deployer = UtilityDeployer::new();
    deployer.deploy(env).await
}
