//! In-process backend: revm executing over a `CacheDB`, either empty (offline) or layered on a
//! lazily hydrated [`ForkDB`].

use super::{
    Artifact, ChainAdapter, Receipt, SimulatedClock, SnapshotId, TxRequest, UnlockedAccounts,
};
use crate::error::AdapterError;
use crate::fork_db::ForkDB;
use crate::identity::{derive_pool_accounts, Identity};
use crate::utils::constants::{
    DEFAULT_ACCOUNT_POOL_SIZE, DEFAULT_TX_GAS_LIMIT, POOL_ACCOUNT_NATIVE_BALANCE,
};
use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use revm::db::{AccountState, CacheDB, EmptyDB};
use revm::primitives::{AccountInfo, EVMError, ExecutionResult, Output, TxKind};
use revm::{Database, DatabaseRef, Evm};
use std::collections::HashMap;
use std::fmt::Debug;

/// Genesis timestamp for offline chains; any fixed value keeps runs reproducible.
const OFFLINE_GENESIS_TIMESTAMP: u64 = 1_700_000_000;

#[derive(Debug, Clone)]
pub struct RevmOptions {
    pub chain_id: u64,
    pub block_time_secs: u64,
    pub pool_size: usize,
    pub test_mode: bool,
    pub gas_limit: u64,
}

impl Default for RevmOptions {
    fn default() -> Self {
        Self {
            chain_id: 1,
            block_time_secs: 12,
            pool_size: DEFAULT_ACCOUNT_POOL_SIZE,
            test_mode: true,
            gas_limit: DEFAULT_TX_GAS_LIMIT,
        }
    }
}

pub struct RevmChain<DB: DatabaseRef> {
    db: CacheDB<DB>,
    unlocked: UnlockedAccounts,
    clock: SimulatedClock,
    options: RevmOptions,
    snapshots: HashMap<u64, (CacheDB<DB>, SimulatedClock)>,
    next_snapshot: u64,
    tx_count: u64,
}

impl RevmChain<EmptyDB> {
    pub fn offline(options: RevmOptions) -> Self {
        let clock = SimulatedClock::starting_at(1, OFFLINE_GENESIS_TIMESTAMP);
        Self::new(EmptyDB::default(), clock, options)
    }
}

impl RevmChain<ForkDB> {
    pub fn forked(db: ForkDB, options: RevmOptions) -> Result<Self, AdapterError> {
        let head = db.fork_head()?;
        tracing::info!(
            "[REVM] Forked at block {} (timestamp {})",
            head.number,
            head.timestamp
        );
        Ok(Self::new(
            db,
            SimulatedClock::starting_at(head.number, head.timestamp),
            options,
        ))
    }
}

impl<DB> RevmChain<DB>
where
    DB: DatabaseRef + Clone,
    DB::Error: Into<AdapterError> + Debug,
{
    pub fn new(db: DB, clock: SimulatedClock, options: RevmOptions) -> Self {
        let pool = derive_pool_accounts(options.pool_size);
        let mut db = CacheDB::new(db);
        for account in &pool {
            db.insert_account_info(
                *account,
                AccountInfo {
                    balance: POOL_ACCOUNT_NATIVE_BALANCE,
                    ..Default::default()
                },
            );
        }
        Self {
            db,
            unlocked: UnlockedAccounts::new(pool, options.test_mode),
            clock,
            options,
            snapshots: HashMap::new(),
            next_snapshot: 0,
            tx_count: 0,
        }
    }

    fn execute(
        &mut self,
        caller: Address,
        kind: TxKind,
        data: Bytes,
        value: U256,
        commit: bool,
    ) -> Result<ExecutionResult, AdapterError> {
        let clock = self.clock;
        let chain_id = self.options.chain_id;
        let gas_limit = self.options.gas_limit;
        let mut evm = Evm::builder()
            .with_db(&mut self.db)
            .modify_cfg_env(|cfg| cfg.chain_id = chain_id)
            .modify_block_env(|block| {
                block.number = U256::from(clock.block_number);
                block.timestamp = U256::from(clock.timestamp);
                block.basefee = U256::ZERO;
                block.gas_limit = U256::from(gas_limit);
            })
            .modify_tx_env(|tx| {
                tx.caller = caller;
                tx.transact_to = kind;
                tx.data = data;
                tx.value = value;
                tx.gas_limit = gas_limit;
                tx.gas_price = U256::ZERO;
                tx.nonce = None;
            })
            .build();
        if commit {
            evm.transact_commit().map_err(map_evm_error)
        } else {
            evm.transact()
                .map(|result_and_state| result_and_state.result)
                .map_err(map_evm_error)
        }
    }

    fn next_tx_hash(&mut self, sender: Address) -> B256 {
        self.tx_count += 1;
        let mut preimage = Vec::with_capacity(36);
        preimage.extend_from_slice(sender.as_slice());
        preimage.extend_from_slice(&self.tx_count.to_be_bytes());
        preimage.extend_from_slice(&self.clock.block_number.to_be_bytes());
        keccak256(preimage)
    }
}

fn map_evm_error<E: Into<AdapterError> + Debug>(err: EVMError<E>) -> AdapterError {
    match err {
        EVMError::Database(db_err) => db_err.into(),
        other => AdapterError::Backend(format!("revm rejected transaction: {other:?}")),
    }
}

fn revert_error(output: Bytes) -> AdapterError {
    AdapterError::Revert {
        reason: crate::contracts::decode_revert_reason(&output),
        data: output,
    }
}

impl<DB> ChainAdapter for RevmChain<DB>
where
    DB: DatabaseRef + Clone,
    DB::Error: Into<AdapterError> + Debug,
{
    fn accounts(&self) -> &[Address] {
        self.unlocked.pool()
    }

    fn deploy(
        &mut self,
        artifact: &Artifact,
        deployer: &Identity,
        constructor_args: &[u8],
    ) -> Result<Address, AdapterError> {
        let tx = TxRequest::create(
            artifact.init_code(constructor_args),
            format!("deploy({})", artifact.name),
        );
        let receipt = self.transact(deployer, tx).map_err(|err| match err {
            AdapterError::Revert { reason, .. } => AdapterError::Deploy {
                artifact: artifact.name.clone(),
                reason: reason.unwrap_or_else(|| "constructor reverted".to_string()),
            },
            AdapterError::Halt(reason) => AdapterError::Deploy {
                artifact: artifact.name.clone(),
                reason,
            },
            other => other,
        })?;
        let address = receipt.contract_address.ok_or_else(|| AdapterError::Deploy {
            artifact: artifact.name.clone(),
            reason: "no contract address in receipt".to_string(),
        })?;
        tracing::debug!("[REVM] Deployed {} at {:?}", artifact.name, address);
        Ok(address)
    }

    fn call(&mut self, target: Address, data: Bytes) -> Result<Bytes, AdapterError> {
        match self.execute(Address::ZERO, TxKind::Call(target), data, U256::ZERO, false)? {
            ExecutionResult::Success { output, .. } => Ok(output.into_data()),
            ExecutionResult::Revert { output, .. } => Err(revert_error(output)),
            ExecutionResult::Halt { reason, .. } => Err(AdapterError::Halt(format!("{reason:?}"))),
        }
    }

    fn transact(&mut self, sender: &Identity, tx: TxRequest) -> Result<Receipt, AdapterError> {
        self.unlocked.authorize(sender)?;
        // Automine: every transaction lands in its own block.
        self.clock.mine(1, self.options.block_time_secs);
        let tx_hash = self.next_tx_hash(sender.address);
        let kind = match tx.to {
            Some(to) => TxKind::Call(to),
            None => TxKind::Create,
        };
        let result = self.execute(sender.address, kind, tx.data, tx.value, true)?;
        match result {
            ExecutionResult::Success {
                gas_used, output, ..
            } => {
                let contract_address = match output {
                    Output::Create(_, address) => address,
                    Output::Call(_) => None,
                };
                Ok(Receipt {
                    label: tx.label,
                    tx_hash,
                    block_number: self.clock.block_number,
                    gas_used,
                    contract_address,
                })
            }
            ExecutionResult::Revert { output, .. } => {
                tracing::debug!("[REVM] {} reverted", tx.label);
                Err(revert_error(output))
            }
            ExecutionResult::Halt { reason, .. } => {
                Err(AdapterError::Halt(format!("{}: {reason:?}", tx.label)))
            }
        }
    }

    fn native_balance(&mut self, owner: Address) -> Result<U256, AdapterError> {
        let info = self.db.basic(owner).map_err(Into::<AdapterError>::into)?;
        Ok(info.map(|info| info.balance).unwrap_or_default())
    }

    fn impersonate(&mut self, address: Address) -> Result<Identity, AdapterError> {
        let identity = self.unlocked.impersonate(address)?;
        let account = self
            .db
            .load_account(address)
            .map_err(Into::<AdapterError>::into)?;
        if account.info.balance.is_zero() {
            account.info.balance = POOL_ACCOUNT_NATIVE_BALANCE;
            // A cached `NotExisting` marker would hide the new balance from every later read.
            if account.account_state == AccountState::NotExisting {
                account.account_state = AccountState::Touched;
            }
        }
        Ok(identity)
    }

    fn advance_time(&mut self, seconds: u64) -> Result<(), AdapterError> {
        self.clock.advance_time(seconds);
        Ok(())
    }

    fn mine_blocks(&mut self, blocks: u64) -> Result<(), AdapterError> {
        self.clock.mine(blocks, self.options.block_time_secs);
        Ok(())
    }

    fn clock(&self) -> SimulatedClock {
        self.clock
    }

    fn snapshot(&mut self) -> Result<SnapshotId, AdapterError> {
        let id = self.next_snapshot;
        self.next_snapshot += 1;
        self.snapshots.insert(id, (self.db.clone(), self.clock));
        Ok(SnapshotId(id))
    }

    fn revert_to(&mut self, id: SnapshotId) -> Result<(), AdapterError> {
        let (db, clock) = self
            .snapshots
            .remove(&id.0)
            .ok_or(AdapterError::UnknownSnapshot(id.0))?;
        // Later snapshots describe a state that no longer exists.
        self.snapshots.retain(|other, _| *other < id.0);
        self.db = db;
        self.clock = clock;
        Ok(())
    }
}
