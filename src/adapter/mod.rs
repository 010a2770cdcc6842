//! Binding to the stateful external ledger the harness drives.
//!
//! Every backend exposes the same narrow surface: deploy, read-only call, state-mutating
//! transact from an unlocked identity, clock control, and snapshots. Impersonation of
//! arbitrary addresses is a test-mode capability; adapters opened without it refuse.

pub mod anvil;
pub mod artifact;
pub mod evm;

pub use artifact::Artifact;

use crate::error::AdapterError;
use crate::identity::{Authority, Identity, Role};
use alloy::primitives::{Address, Bytes, B256, U256};
use serde::Serialize;
use std::collections::HashSet;

pub trait ChainAdapter {
    /// Unlocked accounts the identity registry allocates from, in a stable order.
    fn accounts(&self) -> &[Address];

    fn deploy(
        &mut self,
        artifact: &Artifact,
        deployer: &Identity,
        constructor_args: &[u8],
    ) -> Result<Address, AdapterError>;

    /// Read-only execution against the latest state. Never mutates the ledger.
    fn call(&mut self, target: Address, data: Bytes) -> Result<Bytes, AdapterError>;

    /// State-mutating transaction; reverts surface as [`AdapterError::Revert`].
    fn transact(&mut self, sender: &Identity, tx: TxRequest) -> Result<Receipt, AdapterError>;

    fn native_balance(&mut self, owner: Address) -> Result<U256, AdapterError>;

    /// Grant transact rights over `address` without its key. Test mode only.
    fn impersonate(&mut self, address: Address) -> Result<Identity, AdapterError>;

    fn advance_time(&mut self, seconds: u64) -> Result<(), AdapterError>;

    fn mine_blocks(&mut self, blocks: u64) -> Result<(), AdapterError>;

    fn clock(&self) -> SimulatedClock;

    fn snapshot(&mut self) -> Result<SnapshotId, AdapterError>;

    fn revert_to(&mut self, id: SnapshotId) -> Result<(), AdapterError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    /// `None` deploys `data` as init code.
    pub to: Option<Address>,
    pub data: Bytes,
    pub value: U256,
    pub label: String,
}

impl TxRequest {
    pub fn call(to: Address, data: Bytes, label: impl Into<String>) -> Self {
        Self {
            to: Some(to),
            data,
            value: U256::ZERO,
            label: label.into(),
        }
    }

    pub fn value_transfer(to: Address, value: U256) -> Self {
        Self {
            to: Some(to),
            data: Bytes::new(),
            value,
            label: "transfer(native)".to_string(),
        }
    }

    pub fn create(init_code: Bytes, label: impl Into<String>) -> Self {
        Self {
            to: None,
            data: init_code,
            value: U256::ZERO,
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub label: String,
    pub tx_hash: B256,
    pub block_number: u64,
    pub gas_used: u64,
    pub contract_address: Option<Address>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SnapshotId(pub u64);

/// Monotonic view of simulated time: block height and timestamp relative to where the
/// session started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SimulatedClock {
    pub genesis_block: u64,
    pub genesis_timestamp: u64,
    pub block_number: u64,
    pub timestamp: u64,
}

impl SimulatedClock {
    pub fn starting_at(block_number: u64, timestamp: u64) -> Self {
        Self {
            genesis_block: block_number,
            genesis_timestamp: timestamp,
            block_number,
            timestamp,
        }
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.timestamp.saturating_sub(self.genesis_timestamp)
    }

    pub fn blocks_advanced(&self) -> u64 {
        self.block_number.saturating_sub(self.genesis_block)
    }

    pub fn advance_time(&mut self, seconds: u64) {
        self.timestamp = self.timestamp.saturating_add(seconds);
    }

    /// Each mined block lands `block_time` seconds after its parent.
    pub fn mine(&mut self, blocks: u64, block_time: u64) {
        self.block_number = self.block_number.saturating_add(blocks);
        self.timestamp = self
            .timestamp
            .saturating_add(blocks.saturating_mul(block_time));
    }
}

/// Which senders an adapter will sign for: its pool plus anything impersonated.
#[derive(Debug, Clone)]
pub struct UnlockedAccounts {
    pool: Vec<Address>,
    impersonated: HashSet<Address>,
    test_mode: bool,
}

impl UnlockedAccounts {
    pub fn new(pool: Vec<Address>, test_mode: bool) -> Self {
        Self {
            pool,
            impersonated: HashSet::new(),
            test_mode,
        }
    }

    pub fn pool(&self) -> &[Address] {
        &self.pool
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    pub fn authorize(&self, sender: &Identity) -> Result<(), AdapterError> {
        let unlocked = match sender.authority {
            Authority::Pool(slot) => self.pool.get(slot) == Some(&sender.address),
            Authority::Impersonated => self.impersonated.contains(&sender.address),
        };
        if unlocked {
            Ok(())
        } else {
            Err(AdapterError::Unauthorized(sender.address))
        }
    }

    pub fn impersonate(&mut self, address: Address) -> Result<Identity, AdapterError> {
        if !self.test_mode {
            return Err(AdapterError::ImpersonationDisabled(address));
        }
        self.impersonated.insert(address);
        Ok(Identity {
            address,
            role: Role::External,
            authority: Authority::Impersonated,
        })
    }

    pub fn is_impersonated(&self, address: &Address) -> bool {
        self.impersonated.contains(address)
    }
}
