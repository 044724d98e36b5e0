// SPDX-License-Identifier: Apache-2.0

//! Handles to deployed contract instances. A handle is created by the
//! deployment orchestrator, owned by exactly one test case, and becomes
//! stale the moment a newer deployment round opens.

use crate::bignum::Big;
use crate::chain::{storage_key, Address, CallError, StorageKey, TestEnv};
use std::collections::HashMap;
use std::fmt;
use tracing::trace;

/// A reference to one deployed contract instance, bound to the deployment
/// round that produced it.
#[derive(Clone)]
pub struct ContractHandle {
    name: String,
    address: Address,
    code_hash: [u8; 32],
    generation: u64,
    env: TestEnv,
}

impl ContractHandle {
    pub(crate) fn new(
        name: impl Into<String>,
        address: Address,
        code_hash: [u8; 32],
        generation: u64,
        env: TestEnv,
    ) -> Self {
        ContractHandle { name: name.into(), address, code_hash, generation, env }
    }

    /// The logical contract name the orchestrator registered this handle
    /// under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn code_hash(&self) -> [u8; 32] {
        self.code_hash
    }

    /// The deployment round this handle belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    // One scheduling round trip, standing in for the wire latency of a real
    // chain client. Keeps every handle operation genuinely asynchronous.
    async fn round_trip(&self) {
        tokio::task::yield_now().await;
    }

    fn with_storage<R>(
        &self,
        f: impl FnOnce(&mut HashMap<StorageKey, Vec<u8>>) -> R,
    ) -> Result<R, CallError> {
        let mut ledger = self.env.lock();
        if ledger.generation != self.generation {
            return Err(CallError::StaleHandle {
                held: self.generation,
                current: ledger.generation,
            });
        }
        let state = ledger
            .contracts
            .get_mut(&self.address)
            .ok_or(CallError::UnknownContract(self.address))?;
        Ok(f(&mut state.storage))
    }

    /// Writes a named storage value.
    pub async fn write(&self, key: &str, value: &Big) -> Result<(), CallError> {
        self.round_trip().await;
        trace!(contract = %self.address, key, %value, "storage write");
        self.with_storage(|storage| {
            storage.insert(storage_key(key), value.to_signed_bytes_be());
        })
    }

    /// Reads a named storage value; `None` when the slot was never written.
    pub async fn read(&self, key: &str) -> Result<Option<Big>, CallError> {
        self.round_trip().await;
        self.with_storage(|storage| {
            storage.get(&storage_key(key)).map(|bytes| Big::from_signed_bytes_be(bytes))
        })
    }

    /// Clears a named storage value, returning what was stored there.
    pub async fn clear(&self, key: &str) -> Result<Option<Big>, CallError> {
        self.round_trip().await;
        trace!(contract = %self.address, key, "storage clear");
        self.with_storage(|storage| {
            storage.remove(&storage_key(key)).map(|bytes| Big::from_signed_bytes_be(&bytes))
        })
    }

    /// Sends value from an account to this contract.
    pub async fn deposit(&self, from: Address, value: u128) -> Result<(), CallError> {
        self.round_trip().await;
        // the staleness guard applies to deposits as well
        self.with_storage(|_| ())?;
        self.env.transfer(from, self.address, value)
    }

    /// This instance's balance.
    pub async fn balance(&self) -> Result<u128, CallError> {
        self.round_trip().await;
        self.with_storage(|_| ())?;
        Ok(self.env.balance_of(self.address))
    }
}

impl fmt::Debug for ContractHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ContractHandle")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("generation", &self.generation)
            .finish()
    }
}
