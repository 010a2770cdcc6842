//! JSON-RPC backend for an externally running anvil (or hardhat) fork.

use super::{
    Artifact, ChainAdapter, Receipt, SimulatedClock, SnapshotId, TxRequest, UnlockedAccounts,
};
use crate::error::AdapterError;
use crate::identity::Identity;
use crate::utils::constants::POOL_ACCOUNT_NATIVE_BALANCE;
use crate::utils::rpc::{parse_quantity_u256, parse_quantity_u64, run_with_timeout, HttpProvider};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::Provider;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::borrow::Cow;

#[derive(Debug, Clone)]
pub struct AnvilOptions {
    pub timeout_ms: u64,
    pub test_mode: bool,
}

pub struct AnvilChain {
    provider: HttpProvider,
    runtime: tokio::runtime::Runtime,
    unlocked: UnlockedAccounts,
    clock: SimulatedClock,
    timeout_ms: u64,
}

impl AnvilChain {
    pub fn connect(url: &str, options: AnvilOptions) -> anyhow::Result<Self> {
        let provider = crate::utils::rpc::build_http_provider(url)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| anyhow::anyhow!("failed to bootstrap tokio runtime for anvil: {err}"))?;
        let mut chain = Self {
            provider,
            runtime,
            unlocked: UnlockedAccounts::new(Vec::new(), options.test_mode),
            clock: SimulatedClock::default(),
            timeout_ms: options.timeout_ms,
        };
        let accounts: Vec<Address> = chain.request("eth_accounts", json!([]))?;
        if accounts.is_empty() {
            anyhow::bail!("node at {url} exposes no unlocked accounts");
        }
        chain.unlocked = UnlockedAccounts::new(accounts, options.test_mode);
        let (number, timestamp) = chain.latest_block()?;
        chain.clock = SimulatedClock::starting_at(number, timestamp);
        tracing::info!(
            "[ANVIL] Connected to {} at block {} ({} unlocked accounts)",
            url,
            number,
            chain.unlocked.pool().len()
        );
        Ok(chain)
    }

    fn request<R>(&self, method: &'static str, params: Value) -> Result<R, AdapterError>
    where
        R: DeserializeOwned + std::fmt::Debug + Send + Sync + Unpin + 'static,
    {
        self.runtime.block_on(run_with_timeout(
            method,
            self.timeout_ms,
            self.provider.raw_request(Cow::Borrowed(method), params),
        ))
    }

    fn latest_block(&self) -> Result<(u64, u64), AdapterError> {
        let block: Value = self.request("eth_getBlockByNumber", json!(["latest", false]))?;
        let field = |name: &str| -> Result<u64, AdapterError> {
            block
                .get(name)
                .and_then(Value::as_str)
                .ok_or_else(|| AdapterError::Decode(format!("latest block missing `{name}`")))
                .and_then(|raw| {
                    parse_quantity_u64(raw).map_err(|err| AdapterError::Decode(err.to_string()))
                })
        };
        Ok((field("number")?, field("timestamp")?))
    }

    fn refresh_clock(&mut self) -> Result<(), AdapterError> {
        let (number, timestamp) = self.latest_block()?;
        self.clock.block_number = number;
        self.clock.timestamp = timestamp;
        Ok(())
    }

    /// Some nodes mine reverted transactions instead of rejecting them; replay against the
    /// parent block to recover the reason.
    fn replay_revert(&self, from: Address, tx: &TxRequest, block_number: u64) -> AdapterError {
        let parent = format!("0x{:x}", block_number.saturating_sub(1));
        match self.request::<Bytes>("eth_call", json!([tx_object(from, tx), parent])) {
            Err(err @ AdapterError::Revert { .. }) => err,
            _ => AdapterError::Revert {
                reason: None,
                data: Bytes::new(),
            },
        }
    }
}

/// `eth_sendTransaction` / `eth_call` request object.
pub fn tx_object(from: Address, tx: &TxRequest) -> Value {
    let mut object = json!({
        "from": from,
        "data": tx.data,
        "value": format!("0x{:x}", tx.value),
    });
    if let Some(to) = tx.to {
        object["to"] = json!(to);
    }
    object
}

/// Build a [`Receipt`] from an `eth_getTransactionReceipt` result. Returns the receipt and
/// whether the transaction succeeded.
pub fn parse_receipt(label: &str, raw: &Value) -> Result<(Receipt, bool), AdapterError> {
    let quantity = |name: &str| -> Result<u64, AdapterError> {
        raw.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| AdapterError::Decode(format!("receipt missing `{name}`")))
            .and_then(|v| parse_quantity_u64(v).map_err(|err| AdapterError::Decode(err.to_string())))
    };
    let tx_hash = raw
        .get("transactionHash")
        .and_then(Value::as_str)
        .and_then(|h| h.parse::<B256>().ok())
        .ok_or_else(|| AdapterError::Decode("receipt missing `transactionHash`".to_string()))?;
    let contract_address = raw
        .get("contractAddress")
        .and_then(Value::as_str)
        .and_then(|a| a.parse::<Address>().ok());
    let status = raw
        .get("status")
        .and_then(Value::as_str)
        .map(|s| s != "0x0")
        .unwrap_or(true);
    Ok((
        Receipt {
            label: label.to_string(),
            tx_hash,
            block_number: quantity("blockNumber")?,
            gas_used: quantity("gasUsed")?,
            contract_address,
        },
        status,
    ))
}

impl ChainAdapter for AnvilChain {
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
            other => other,
        })?;
        let address = receipt.contract_address.ok_or_else(|| AdapterError::Deploy {
            artifact: artifact.name.clone(),
            reason: "no contract address in receipt".to_string(),
        })?;
        tracing::debug!("[ANVIL] Deployed {} at {:?}", artifact.name, address);
        Ok(address)
    }

    fn call(&mut self, target: Address, data: Bytes) -> Result<Bytes, AdapterError> {
        self.request(
            "eth_call",
            json!([{ "to": target, "data": data }, "latest"]),
        )
    }

    fn transact(&mut self, sender: &Identity, tx: TxRequest) -> Result<Receipt, AdapterError> {
        self.unlocked.authorize(sender)?;
        let tx_hash: B256 = self.request(
            "eth_sendTransaction",
            json!([tx_object(sender.address, &tx)]),
        )?;
        let raw: Value = self.request("eth_getTransactionReceipt", json!([tx_hash]))?;
        if raw.is_null() {
            return Err(AdapterError::Backend(format!(
                "{}: no receipt for {tx_hash} (is automine disabled?)",
                tx.label
            )));
        }
        let (receipt, succeeded) = parse_receipt(&tx.label, &raw)?;
        self.refresh_clock()?;
        if !succeeded {
            tracing::debug!("[ANVIL] {} reverted in block {}", tx.label, receipt.block_number);
            return Err(self.replay_revert(sender.address, &tx, receipt.block_number));
        }
        Ok(receipt)
    }

    fn native_balance(&mut self, owner: Address) -> Result<U256, AdapterError> {
        let raw: String = self.request("eth_getBalance", json!([owner, "latest"]))?;
        parse_quantity_u256(&raw).map_err(|err| AdapterError::Decode(err.to_string()))
    }

    fn impersonate(&mut self, address: Address) -> Result<Identity, AdapterError> {
        let identity = self.unlocked.impersonate(address)?;
        let _: Value = self.request("anvil_impersonateAccount", json!([address]))?;
        if self.native_balance(address)?.is_zero() {
            let _: Value = self.request(
                "anvil_setBalance",
                json!([address, format!("0x{:x}", POOL_ACCOUNT_NATIVE_BALANCE)]),
            )?;
        }
        tracing::debug!("[ANVIL] Impersonating {:?}", address);
        Ok(identity)
    }

    fn advance_time(&mut self, seconds: u64) -> Result<(), AdapterError> {
        let _: Value = self.request("evm_increaseTime", json!([seconds]))?;
        self.clock.advance_time(seconds);
        Ok(())
    }

    fn mine_blocks(&mut self, blocks: u64) -> Result<(), AdapterError> {
        if blocks == 0 {
            return Ok(());
        }
        let _: Value = self.request("anvil_mine", mine_params(blocks))?;
        self.refresh_clock()
    }

    fn clock(&self) -> SimulatedClock {
        self.clock
    }

    fn snapshot(&mut self) -> Result<SnapshotId, AdapterError> {
        let raw: String = self.request("evm_snapshot", json!([]))?;
        parse_quantity_u64(&raw)
            .map(SnapshotId)
            .map_err(|err| AdapterError::Decode(err.to_string()))
    }

    fn revert_to(&mut self, id: SnapshotId) -> Result<(), AdapterError> {
        let reverted: bool = self.request("evm_revert", json!([format!("0x{:x}", id.0)]))?;
        if !reverted {
            return Err(AdapterError::UnknownSnapshot(id.0));
        }
        self.refresh_clock()
    }
}

/// One `anvil_mine` request covers the whole batch.
fn mine_params(blocks: u64) -> Value {
    json!([format!("0x{blocks:x}")])
}
