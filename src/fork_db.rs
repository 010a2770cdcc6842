use crate::error::AdapterError;
use crate::utils::rpc::{run_with_timeout, HttpProvider};
use alloy::primitives::{Address, B256, U256};
use alloy::providers::Provider;
use dashmap::DashMap;
use revm::{
    primitives::{AccountInfo, Bytecode, Bytes as rBytes},
    Database, DatabaseRef,
};
use std::borrow::Cow;
use std::future::Future;
use std::sync::{Arc, OnceLock};

const MAX_BLOCK_HASH_CACHE_ENTRIES: usize = 2048;
const MAX_STORAGE_CACHE_ENTRIES: usize = 200_000;
const MAX_ACCOUNT_INFO_CACHE_ENTRIES: usize = 100_000;
const BRIDGE_WORKER_QUEUE_CAPACITY: usize = 256;
/// EVM `BLOCKHASH` only resolves the 256 most recent ancestors.
const BLOCK_HASH_WINDOW: u64 = 256;

type BridgeJob = Box<dyn FnOnce() + Send + 'static>;

/// Lazily hydrated, read-only view of a remote chain pinned at one block.
///
/// Every account, slot and block hash is fetched on first touch and cached for the lifetime
/// of the handle; clones share the caches. Writes never reach this layer: the in-process
/// backend wraps it in a `CacheDB` that holds all local mutations.
#[derive(Clone)]
pub struct ForkDB {
    provider: HttpProvider,
    handle: tokio::runtime::Handle,
    runtime_guard: Option<Arc<tokio::runtime::Runtime>>,
    block_number: u64,
    timeout_ms: u64,
    block_hash_cache: Arc<DashMap<u64, B256>>,
    code_by_hash_cache: Arc<DashMap<B256, Bytecode>>,
    storage_cache: Arc<DashMap<(Address, U256), U256>>,
    account_info_cache: Arc<DashMap<Address, Option<AccountInfo>>>,
}

/// Block the fork was pinned at, as seen by the remote node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForkHead {
    pub number: u64,
    pub timestamp: u64,
}

impl ForkDB {
    fn bridge_worker_sender() -> &'static std::sync::mpsc::SyncSender<BridgeJob> {
        static TX: OnceLock<std::sync::mpsc::SyncSender<BridgeJob>> = OnceLock::new();
        TX.get_or_init(|| {
            let (tx, rx) = std::sync::mpsc::sync_channel::<BridgeJob>(BRIDGE_WORKER_QUEUE_CAPACITY);
            let _ = std::thread::Builder::new()
                .name("forkdb-bridge-worker".to_string())
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        job();
                    }
                });
            tx
        })
    }

    /// Pin to `block_number`, or to the remote head when `None`.
    pub fn connect(url: &str, block_number: Option<u64>, timeout_ms: u64) -> anyhow::Result<Self> {
        let provider = crate::utils::rpc::build_http_provider(url)?;
        let (handle, runtime_guard) = match tokio::runtime::Handle::try_current() {
            Ok(handle) => (handle, None),
            Err(_) => {
                // Synchronous call sites (CLI, tests) have no ambient runtime.
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()
                    .map_err(|err| {
                        anyhow::anyhow!("failed to bootstrap tokio runtime for ForkDB: {err}")
                    })?;
                let runtime = Arc::new(runtime);
                (runtime.handle().clone(), Some(runtime))
            }
        };
        let mut db = Self {
            provider,
            handle,
            runtime_guard,
            block_number: block_number.unwrap_or_default(),
            timeout_ms,
            block_hash_cache: Arc::new(DashMap::new()),
            code_by_hash_cache: Arc::new(DashMap::new()),
            storage_cache: Arc::new(DashMap::new()),
            account_info_cache: Arc::new(DashMap::new()),
        };
        if block_number.is_none() {
            let provider = db.provider.clone();
            let timeout_ms = db.timeout_ms;
            db.block_number = db.block_on_bridge(async move {
                run_with_timeout("eth_blockNumber", timeout_ms, provider.get_block_number()).await
            })?;
        }
        tracing::info!("[FORKDB] Pinned fork at block {}", db.block_number);
        Ok(db)
    }

    pub fn with_block_number(url: &str, block_number: u64) -> anyhow::Result<Self> {
        Self::connect(
            url,
            Some(block_number),
            crate::utils::constants::DEFAULT_RPC_TIMEOUT_MS,
        )
    }

    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    /// Number and timestamp of the pinned block; seeds the simulated clock.
    pub fn fork_head(&self) -> Result<ForkHead, AdapterError> {
        let provider = self.provider.clone();
        let number = self.block_number;
        let timeout_ms = self.timeout_ms;
        self.block_on_bridge(async move {
            let raw = fetch_block(&provider, number, timeout_ms).await?;
            let timestamp = raw
                .get("timestamp")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    AdapterError::Backend("eth_getBlockByNumber missing timestamp".to_string())
                })
                .and_then(|ts| {
                    crate::utils::rpc::parse_quantity_u64(ts)
                        .map_err(|err| AdapterError::Decode(err.to_string()))
                })?;
            Ok(ForkHead { number, timestamp })
        })
    }

    fn trim_cache<K, V>(cache: &DashMap<K, V>, max_entries: usize)
    where
        K: Eq + std::hash::Hash + Clone,
    {
        let len = cache.len();
        if len <= max_entries {
            return;
        }
        let excess = len.saturating_sub(max_entries);
        let keys: Vec<K> = cache
            .iter()
            .take(excess)
            .map(|entry| entry.key().clone())
            .collect();
        for key in keys {
            cache.remove(&key);
        }
    }

    fn block_on_bridge<T, Fut>(&self, fut: Fut) -> Result<T, AdapterError>
    where
        Fut: Future<Output = Result<T, AdapterError>> + Send + 'static,
        T: Send + 'static,
    {
        if let Ok(current) = tokio::runtime::Handle::try_current() {
            if self.runtime_guard.is_none()
                && current.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread
            {
                return tokio::task::block_in_place(|| {
                    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        self.handle.block_on(fut)
                    })) {
                        Ok(result) => result,
                        Err(_) => Err(AdapterError::Transport(
                            "fork_db bridge block_on panicked (runtime likely shutting down)"
                                .to_string(),
                        )),
                    }
                });
            }

            // Current-thread runtimes can neither block_in_place nor nest block_on.
            let (tx, rx) = std::sync::mpsc::sync_channel(1);
            let job: BridgeJob = Box::new(move || {
                let out = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|err| {
                        AdapterError::Transport(format!(
                            "fork_db bridge helper failed to bootstrap local runtime: {err}"
                        ))
                    })
                    .and_then(|rt| rt.block_on(fut));
                let _ = tx.send(out);
            });
            if let Err(err) = Self::bridge_worker_sender().try_send(job) {
                return Err(AdapterError::Transport(match err {
                    std::sync::mpsc::TrySendError::Full(_) => {
                        "fork_db bridge queue full".to_string()
                    }
                    std::sync::mpsc::TrySendError::Disconnected(_) => {
                        "fork_db bridge worker unavailable".to_string()
                    }
                }));
            }
            let waited_ms = self.timeout_ms.saturating_add(1_000);
            return match rx.recv_timeout(std::time::Duration::from_millis(waited_ms)) {
                Ok(result) => result,
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => Err(AdapterError::Timeout {
                    waited_ms,
                    context: "fork_db bridge".to_string(),
                }),
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    Err(AdapterError::Transport(
                        "fork_db bridge helper terminated before returning".to_string(),
                    ))
                }
            };
        }

        self.handle.block_on(fut)
    }
}

async fn fetch_block(
    provider: &HttpProvider,
    number: u64,
    timeout_ms: u64,
) -> Result<serde_json::Value, AdapterError> {
    let raw: serde_json::Value = run_with_timeout(
        "eth_getBlockByNumber",
        timeout_ms,
        provider.raw_request(
            Cow::Borrowed("eth_getBlockByNumber"),
            serde_json::json!([format!("0x{number:x}"), false]),
        ),
    )
    .await?;
    if raw.is_null() {
        return Err(AdapterError::Backend(format!(
            "block {number} unknown to fork RPC"
        )));
    }
    Ok(raw)
}

fn parse_quantity(context: &str, raw: &str) -> Result<U256, AdapterError> {
    crate::utils::rpc::parse_quantity_u256(raw)
        .map_err(|err| AdapterError::Decode(format!("{context}: {err}")))
}

impl DatabaseRef for ForkDB {
    type Error = AdapterError;

    fn basic_ref(&self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        if let Some(hit) = self.account_info_cache.get(&address) {
            return Ok(hit.value().clone());
        }

        let provider = self.provider.clone();
        let tag = format!("0x{:x}", self.block_number);
        let timeout_ms = self.timeout_ms;
        let (balance, code, nonce) = self.block_on_bridge(async move {
            let params = serde_json::json!([address, tag]);
            let balance_fut = run_with_timeout::<String, _>(
                "eth_getBalance",
                timeout_ms,
                provider.raw_request(Cow::Borrowed("eth_getBalance"), params.clone()),
            );
            let code_fut = run_with_timeout::<String, _>(
                "eth_getCode",
                timeout_ms,
                provider.raw_request(Cow::Borrowed("eth_getCode"), params.clone()),
            );
            let nonce_fut = run_with_timeout::<String, _>(
                "eth_getTransactionCount",
                timeout_ms,
                provider.raw_request(Cow::Borrowed("eth_getTransactionCount"), params.clone()),
            );
            tokio::try_join!(balance_fut, code_fut, nonce_fut)
        })?;

        let balance = parse_quantity("eth_getBalance", &balance)?;
        let nonce = crate::utils::rpc::parse_quantity_u64(&nonce)
            .map_err(|err| AdapterError::Decode(format!("eth_getTransactionCount: {err}")))?;
        let code = hex::decode(crate::utils::hex::clean_hex(&code))
            .map_err(|err| AdapterError::Decode(format!("eth_getCode: {err}")))?;

        let account = if nonce == 0 && balance.is_zero() && code.is_empty() {
            None
        } else {
            let bytecode = Bytecode::new_raw(rBytes::from(code));
            let code_hash = bytecode.hash_slow();
            self.code_by_hash_cache.insert(code_hash, bytecode.clone());
            Some(AccountInfo::new(balance, nonce, code_hash, bytecode))
        };
        self.account_info_cache.insert(address, account.clone());
        Self::trim_cache(&self.account_info_cache, MAX_ACCOUNT_INFO_CACHE_ENTRIES);
        Ok(account)
    }

    fn code_by_hash_ref(&self, code_hash: B256) -> Result<Bytecode, Self::Error> {
        self.code_by_hash_cache
            .get(&code_hash)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AdapterError::Backend(format!("missing bytecode for code hash {code_hash}")))
    }

    fn storage_ref(&self, address: Address, index: U256) -> Result<U256, Self::Error> {
        if let Some(hit) = self.storage_cache.get(&(address, index)) {
            return Ok(*hit);
        }
        let provider = self.provider.clone();
        let tag = format!("0x{:x}", self.block_number);
        let timeout_ms = self.timeout_ms;
        let raw: String = self.block_on_bridge(async move {
            run_with_timeout(
                "eth_getStorageAt",
                timeout_ms,
                provider.raw_request(
                    Cow::Borrowed("eth_getStorageAt"),
                    serde_json::json!([address, index, tag]),
                ),
            )
            .await
        })?;
        let value = parse_quantity("eth_getStorageAt", &raw)?;
        self.storage_cache.insert((address, index), value);
        Self::trim_cache(&self.storage_cache, MAX_STORAGE_CACHE_ENTRIES);
        Ok(value)
    }

    fn block_hash_ref(&self, number: u64) -> Result<B256, Self::Error> {
        let head = self.block_number;
        if number >= head || head.saturating_sub(number) > BLOCK_HASH_WINDOW {
            return Ok(B256::ZERO);
        }
        if let Some(hit) = self.block_hash_cache.get(&number) {
            return Ok(*hit);
        }
        let provider = self.provider.clone();
        let timeout_ms = self.timeout_ms;
        let hash = self.block_on_bridge(async move {
            let raw = fetch_block(&provider, number, timeout_ms).await?;
            raw.get("hash")
                .and_then(|v| v.as_str())
                .and_then(|h| h.parse::<B256>().ok())
                .ok_or_else(|| {
                    AdapterError::Decode("eth_getBlockByNumber missing hash field".to_string())
                })
        })?;
        self.block_hash_cache.insert(number, hash);
        Self::trim_cache(&self.block_hash_cache, MAX_BLOCK_HASH_CACHE_ENTRIES);
        Ok(hash)
    }
}

impl Database for ForkDB {
    type Error = AdapterError;

    fn basic(&mut self, address: Address) -> Result<Option<AccountInfo>, Self::Error> {
        self.basic_ref(address)
    }

    fn code_by_hash(&mut self, code_hash: B256) -> Result<Bytecode, Self::Error> {
        self.code_by_hash_ref(code_hash)
    }

    fn storage(&mut self, address: Address, index: U256) -> Result<U256, Self::Error> {
        self.storage_ref(address, index)
    }

    fn block_hash(&mut self, number: u64) -> Result<B256, Self::Error> {
        self.block_hash_ref(number)
    }
}

#[cfg(test)]
mod tests {
    use super::ForkDB;
    use alloy::primitives::B256;
    use revm::DatabaseRef;

    #[test]
    fn test_block_hash_ref_respects_evm_window_for_pinned_head() {
        let db = ForkDB::with_block_number("http://127.0.0.1:8545", 1_000).expect("forkdb");
        let current = <ForkDB as DatabaseRef>::block_hash_ref(&db, 1_000).expect("current block");
        assert_eq!(current, B256::ZERO);

        let too_old = <ForkDB as DatabaseRef>::block_hash_ref(&db, 743).expect("too old block");
        assert_eq!(too_old, B256::ZERO);
    }

    #[test]
    fn test_code_by_hash_ref_missing_hash_fails_closed() {
        let db = ForkDB::with_block_number("http://127.0.0.1:8545", 1_000).expect("forkdb");
        let result = <ForkDB as DatabaseRef>::code_by_hash_ref(&db, B256::ZERO);
        assert!(result.is_err());
    }

    #[test]
    fn test_clones_share_hydration_caches() {
        let db = ForkDB::with_block_number("http://127.0.0.1:8545", 1_000).expect("forkdb");
        let clone = db.clone();
        db.block_hash_cache.insert(999, B256::repeat_byte(7));
        let hash = <ForkDB as DatabaseRef>::block_hash_ref(&clone, 999).expect("cached hash");
        assert_eq!(hash, B256::repeat_byte(7));
        assert_eq!(clone.block_number(), 1_000);
    }

    #[test]
    fn test_connect_rejects_malformed_url() {
        assert!(ForkDB::connect("not a url", Some(1), 1_000).is_err());
    }
}
