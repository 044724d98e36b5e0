// SPDX-License-Identifier: Apache-2.0

//! In-memory chain test client. One [`TestEnv`] is an isolated ledger
//! session: pre-funded keyring accounts, deployed contract instances with
//! their storage, and a deployment log. It stands in for the external
//! chain-client session the harness is wired to in production use.

use crate::config::{ConfigError, HarnessConfig};
use crate::fixtures::Keyring;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tiny_keccak::{Hasher, Keccak};
use tracing::{debug, trace};

pub(crate) fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut digest = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut digest);
    digest
}

/// A 20-byte account or contract address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address([u8; 20]);

impl Address {
    pub fn new(bytes: [u8; 20]) -> Self {
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A contract storage slot key.
pub type StorageKey = [u8; 32];

/// Storage slot for a named value: the keccak-256 digest of the name.
pub fn storage_key(name: &str) -> StorageKey {
    keccak256(name.as_bytes())
}

#[derive(Debug, Default, Clone)]
pub(crate) struct AccountState {
    pub balance: u128,
    pub nonce: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct ContractState {
    pub code_hash: [u8; 32],
    pub storage: HashMap<StorageKey, Vec<u8>>,
}

/// The ledger behind one test session.
#[derive(Debug, Default)]
pub(crate) struct Ledger {
    pub accounts: HashMap<Address, AccountState>,
    pub contracts: HashMap<Address, ContractState>,
    /// Every instantiation, in order.
    pub deployments: Vec<Address>,
    /// Bumped at the start of every deployment round; handles from earlier
    /// rounds are stale.
    pub generation: u64,
    pub block_number: u64,
}

/// What instantiating a contract costs the deploying account. The deposit
/// becomes the starting balance of the instance.
pub const STORAGE_DEPOSIT: u128 = 20_000;

/// An error from a chain-client operation inside a test case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("stale contract handle: deployment round {held} was superseded by round {current}")]
    StaleHandle { held: u64, current: u64 },

    #[error("no contract deployed at {0}")]
    UnknownContract(Address),

    #[error("unknown account {0}")]
    UnknownAccount(Address),

    #[error("insufficient funds: {available} available, {required} required")]
    InsufficientFunds { available: u128, required: u128 },
}

/// One isolated chain test session. Cheap to clone; clones share the same
/// ledger. Created once per suite and never reset between test cases: test
/// isolation comes from redeploying contracts, not from rebuilding the
/// session.
#[derive(Clone)]
pub struct TestEnv {
    ledger: Arc<Mutex<Ledger>>,
}

impl TestEnv {
    /// A session configured from [`HarnessConfig::load`].
    pub fn new() -> Result<Self, ConfigError> {
        Self::with_config(&HarnessConfig::load()?)
    }

    /// A session with every keyring account funded at the configured
    /// initial balance.
    pub fn with_config(config: &HarnessConfig) -> Result<Self, ConfigError> {
        let balance = config.initial_balance()?;
        let accounts = Keyring::ALL
            .iter()
            .map(|k| (k.address(), AccountState { balance, nonce: 0 }))
            .collect();

        debug!(accounts = Keyring::ALL.len(), balance, "new chain test session");

        Ok(TestEnv {
            ledger: Arc::new(Mutex::new(Ledger {
                accounts,
                block_number: 1,
                ..Default::default()
            })),
        })
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().expect("ledger lock poisoned")
    }

    /// The free balance of an account or contract; zero when unknown.
    pub fn balance_of(&self, addr: Address) -> u128 {
        self.lock().accounts.get(&addr).map(|a| a.balance).unwrap_or_default()
    }

    /// Moves value between two existing accounts.
    pub fn transfer(&self, from: Address, to: Address, value: u128) -> Result<(), CallError> {
        let mut ledger = self.lock();

        let available = ledger
            .accounts
            .get(&from)
            .ok_or(CallError::UnknownAccount(from))?
            .balance;
        if available < value {
            return Err(CallError::InsufficientFunds { available, required: value });
        }
        if !ledger.accounts.contains_key(&to) {
            return Err(CallError::UnknownAccount(to));
        }

        ledger.accounts.get_mut(&from).unwrap().balance -= value;
        ledger.accounts.get_mut(&to).unwrap().balance += value;
        ledger.block_number += 1;
        trace!(%from, %to, value, "transfer");

        Ok(())
    }

    pub fn block_number(&self) -> u64 {
        self.lock().block_number
    }

    /// The current deployment round.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// How many contract instantiations this session has seen.
    pub fn deployment_count(&self) -> usize {
        self.lock().deployments.len()
    }

    /// Every instantiated contract address, in deployment order.
    pub fn deployments(&self) -> Vec<Address> {
        self.lock().deployments.clone()
    }

    /// Opens a new deployment round, invalidating all handles from earlier
    /// rounds. Returns the new round number.
    pub(crate) fn begin_deployment_round(&self) -> u64 {
        let mut ledger = self.lock();
        ledger.generation += 1;
        debug!(generation = ledger.generation, "deployment round opened");
        ledger.generation
    }

    /// Registers a fresh contract instance. The address is derived from the
    /// deploying account and its nonce, so repeated deployments land at
    /// distinct, reproducible addresses. The storage deposit moves from the
    /// deployer to the instance.
    pub(crate) fn instantiate(
        &self,
        code_hash: [u8; 32],
        deployer: Address,
    ) -> Result<Address, CallError> {
        let mut ledger = self.lock();

        let state = ledger
            .accounts
            .get(&deployer)
            .ok_or(CallError::UnknownAccount(deployer))?;
        if state.balance < STORAGE_DEPOSIT {
            return Err(CallError::InsufficientFunds {
                available: state.balance,
                required: STORAGE_DEPOSIT,
            });
        }
        let nonce = state.nonce;

        let mut seed = Vec::with_capacity(28);
        seed.extend_from_slice(deployer.as_bytes());
        seed.extend_from_slice(&nonce.to_be_bytes());
        let digest = keccak256(&seed);
        let mut addr = [0u8; 20];
        addr.copy_from_slice(&digest[12..]);
        let address = Address::new(addr);

        let deployer_state = ledger.accounts.get_mut(&deployer).unwrap();
        deployer_state.balance -= STORAGE_DEPOSIT;
        deployer_state.nonce += 1;

        ledger
            .accounts
            .insert(address, AccountState { balance: STORAGE_DEPOSIT, nonce: 0 });
        ledger
            .contracts
            .insert(address, ContractState { code_hash, storage: HashMap::new() });
        ledger.deployments.push(address);
        ledger.block_number += 1;
        trace!(%address, %deployer, nonce, "instantiated contract");

        Ok(address)
    }
}
