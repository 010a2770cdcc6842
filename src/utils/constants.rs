use alloy::primitives::U256;

/// Standard WAD (10^18)
pub const WAD_U256: U256 = U256::from_limbs([1000000000000000000, 0, 0, 0]);

/// Basis-point denominator for debt ratios and rate limits.
pub const MAX_BPS: u16 = 10_000;

/// Default per-harvest debt-change rate limit handed to `addStrategy`.
pub const DEFAULT_RATE_LIMIT_BPS: u16 = 1_000;

/// Locked profit degrades to zero over this window after a harvest report.
pub const DEFAULT_PROFIT_UNLOCK_SECS: u64 = 6 * 3_600;

/// Relative tolerance used by `assert_approx` unless a step overrides it.
pub const DEFAULT_RELATIVE_APPROX: f64 = 1e-5;

/// Native balance seeded into every locally derived pool account (100 ETH).
pub const POOL_ACCOUNT_NATIVE_BALANCE: U256 =
    U256::from_limbs([0x6bc75e2d63100000, 0x5, 0, 0]);

pub const DEFAULT_ACCOUNT_POOL_SIZE: usize = 10;
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_TX_GAS_LIMIT: u64 = 15_000_000;
