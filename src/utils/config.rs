use crate::config::chains::ChainConfig;
use crate::error::ConfigError;
use crate::fixture::FixtureConfig;
use crate::utils::constants::{
    DEFAULT_ACCOUNT_POOL_SIZE, DEFAULT_RELATIVE_APPROX, DEFAULT_RPC_TIMEOUT_MS, MAX_BPS,
};
use crate::utils::hex::{parse_address, to_u256};
use alloy::primitives::Address;
use std::env;
use std::path::PathBuf;

const DEFAULT_ANVIL_RPC_URL: &str = "http://127.0.0.1:8545";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// In-process revm over a fork of `FORK_RPC_URL`, which must be set.
    Revm,
    Anvil,
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub backend: Backend,
    pub fork_rpc_url: Option<String>,
    pub anvil_rpc_url: String,
    pub fork_block_number: Option<u64>,
    pub chain: ChainConfig,
    pub want_token: Address,
    /// `(token, reserve)` pairs the funding service impersonates.
    pub reserves: Vec<(Address, Address)>,
    pub wrapped_native: Option<Address>,
    pub protected_tokens: Vec<Address>,
    pub governance: Option<Address>,
    pub vault_artifact: PathBuf,
    pub strategy_artifact: PathBuf,
    pub fixture: FixtureConfig,
    pub relative_approx: f64,
    pub account_pool_size: usize,
    pub block_time_secs: u64,
    pub rpc_timeout_ms: u64,
    pub test_mode: bool,
    pub scenarios: Option<Vec<String>>,
    pub parallel: bool,
    pub report_path: Option<PathBuf>,
}

fn validate_http_url(name: &str, raw: &str) -> Result<String, ConfigError> {
    let parsed = raw.trim().parse::<reqwest::Url>().map_err(|e| {
        ConfigError::Invalid(format!("{name} must be a valid URL, got `{raw}`: {e}"))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(raw.trim().to_string()),
        other => Err(ConfigError::Invalid(format!(
            "{name} must use http(s) scheme, got `{other}`"
        ))),
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn address_var(name: &str, raw: &str) -> Result<Address, ConfigError> {
    parse_address(raw)
        .ok_or_else(|| ConfigError::Invalid(format!("{name} must be an address, got `{raw}`")))
}

fn number_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .replace('_', "")
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid(format!("{name} must be a number, got `{raw}`")))
}

/// `token=reserve,token=reserve`
fn parse_reserves(raw: &str) -> Result<Vec<(Address, Address)>, ConfigError> {
    parse_list(raw)
        .iter()
        .map(|entry| {
            let (token, reserve) = entry.split_once('=').ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "ASSET_RESERVES entry must be `token=reserve`, got `{entry}`"
                ))
            })?;
            Ok((
                address_var("ASSET_RESERVES token", token)?,
                address_var("ASSET_RESERVES reserve", reserve)?,
            ))
        })
        .collect()
}

impl HarnessConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = match var("HARNESS_BACKEND")
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("revm") => Backend::Revm,
            Some("anvil") => Backend::Anvil,
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "HARNESS_BACKEND must be `revm` or `anvil`, got `{other}`"
                )))
            }
        };

        let fork_rpc_url = var("FORK_RPC_URL")
            .map(|raw| validate_http_url("FORK_RPC_URL", &raw))
            .transpose()?;
        let anvil_rpc_url = validate_http_url(
            "ANVIL_RPC_URL",
            &var("ANVIL_RPC_URL").unwrap_or_else(|| DEFAULT_ANVIL_RPC_URL.to_string()),
        )?;
        let fork_block_number = var("FORK_BLOCK_NUMBER")
            .map(|raw| number_var::<u64>("FORK_BLOCK_NUMBER", &raw))
            .transpose()?;

        let chain_id = var("CHAIN_ID")
            .map(|raw| number_var::<u64>("CHAIN_ID", &raw))
            .transpose()?
            .unwrap_or(1);
        let chain = ChainConfig::get(chain_id);

        let mut reserves = var("ASSET_RESERVES")
            .map(|raw| parse_reserves(&raw))
            .transpose()?
            .unwrap_or_default();
        let want_token = match var("WANT_TOKEN") {
            Some(raw) => address_var("WANT_TOKEN", &raw)?,
            None => chain.default_want.map(|want| want.token).ok_or_else(|| {
                ConfigError::Missing(format!(
                    "WANT_TOKEN must be set (no default for chain {chain_id})"
                ))
            })?,
        };
        if let Some(default) = chain.default_want {
            if default.token == want_token && !reserves.iter().any(|(t, _)| *t == want_token) {
                reserves.push((default.token, default.reserve));
            }
        }

        let wrapped_native = match var("WRAPPED_NATIVE") {
            Some(raw) => Some(address_var("WRAPPED_NATIVE", &raw)?),
            None => chain.wrapped_native,
        };
        let protected_tokens = match var("PROTECTED_TOKENS") {
            Some(raw) => parse_list(&raw)
                .iter()
                .map(|entry| address_var("PROTECTED_TOKENS", entry))
                .collect::<Result<Vec<_>, _>>()?,
            None => chain.protected_tokens.clone(),
        };
        let governance = var("GOVERNANCE_ADDRESS")
            .map(|raw| address_var("GOVERNANCE_ADDRESS", &raw))
            .transpose()?;

        let vault_artifact = var("VAULT_ARTIFACT")
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError::Missing("VAULT_ARTIFACT must be set".to_string()))?;
        let strategy_artifact = var("STRATEGY_ARTIFACT")
            .map(PathBuf::from)
            .ok_or_else(|| ConfigError::Missing("STRATEGY_ARTIFACT must be set".to_string()))?;

        let mut fixture = FixtureConfig::default();
        if let Some(raw) = var("DEPOSIT_LIMIT") {
            fixture.deposit_limit = to_u256(&raw).ok_or_else(|| {
                ConfigError::Invalid(format!("DEPOSIT_LIMIT must be an amount, got `{raw}`"))
            })?;
        }
        if let Some(raw) = var("DEBT_RATIO_BPS") {
            fixture.debt_ratio_bps = number_var("DEBT_RATIO_BPS", &raw)?;
        }
        if let Some(raw) = var("MIN_DEBT_PER_HARVEST") {
            fixture.min_debt_per_harvest = to_u256(&raw).ok_or_else(|| {
                ConfigError::Invalid(format!("MIN_DEBT_PER_HARVEST must be an amount, got `{raw}`"))
            })?;
        }
        if let Some(raw) = var("MAX_DEBT_PER_HARVEST") {
            fixture.max_debt_per_harvest = to_u256(&raw).ok_or_else(|| {
                ConfigError::Invalid(format!("MAX_DEBT_PER_HARVEST must be an amount, got `{raw}`"))
            })?;
        }
        if let Some(raw) = var("RATE_LIMIT_BPS") {
            fixture.rate_limit_bps = number_var("RATE_LIMIT_BPS", &raw)?;
        }
        if let Some(raw) = var("PROFIT_UNLOCK_SECS") {
            fixture.profit_unlock_secs = number_var("PROFIT_UNLOCK_SECS", &raw)?;
        }
        if let Some(raw) = var("DEPOSITOR_UNITS") {
            fixture.depositor_units = parse_list(&raw)
                .iter()
                .map(|entry| number_var::<u64>("DEPOSITOR_UNITS", entry))
                .collect::<Result<Vec<_>, _>>()?;
        }
        if fixture.debt_ratio_bps > MAX_BPS {
            return Err(ConfigError::Invalid(format!(
                "DEBT_RATIO_BPS must be at most {MAX_BPS}, got {}",
                fixture.debt_ratio_bps
            )));
        }
        if fixture.rate_limit_bps > MAX_BPS {
            return Err(ConfigError::Invalid(format!(
                "RATE_LIMIT_BPS must be at most {MAX_BPS}, got {}",
                fixture.rate_limit_bps
            )));
        }

        let relative_approx = var("RELATIVE_APPROX")
            .map(|raw| number_var::<f64>("RELATIVE_APPROX", &raw))
            .transpose()?
            .unwrap_or(DEFAULT_RELATIVE_APPROX);
        if !(relative_approx > 0.0 && relative_approx < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "RELATIVE_APPROX must lie in (0, 1), got {relative_approx}"
            )));
        }

        if backend == Backend::Revm && fork_rpc_url.is_none() {
            return Err(ConfigError::Missing(
                "FORK_RPC_URL must be set for the revm backend".to_string(),
            ));
        }

        Ok(Self {
            backend,
            fork_rpc_url,
            anvil_rpc_url,
            fork_block_number,
            want_token,
            reserves,
            wrapped_native,
            protected_tokens,
            governance,
            vault_artifact,
            strategy_artifact,
            fixture,
            relative_approx,
            account_pool_size: var("ACCOUNT_POOL_SIZE")
                .map(|raw| number_var::<usize>("ACCOUNT_POOL_SIZE", &raw))
                .transpose()?
                .unwrap_or(DEFAULT_ACCOUNT_POOL_SIZE),
            block_time_secs: var("BLOCK_TIME_SECS")
                .map(|raw| number_var::<u64>("BLOCK_TIME_SECS", &raw))
                .transpose()?
                .unwrap_or(chain.block_time_secs),
            rpc_timeout_ms: var("RPC_TIMEOUT_MS")
                .map(|raw| number_var::<u64>("RPC_TIMEOUT_MS", &raw))
                .transpose()?
                .unwrap_or(DEFAULT_RPC_TIMEOUT_MS),
            test_mode: var("HARNESS_TEST_MODE")
                .map(|raw| parse_flag(&raw))
                .unwrap_or(true),
            scenarios: var("HARNESS_SCENARIOS").map(|raw| parse_list(&raw)),
            parallel: var("HARNESS_PARALLEL")
                .map(|raw| parse_flag(&raw))
                .unwrap_or(false),
            report_path: var("HARNESS_REPORT_PATH").map(PathBuf::from),
            chain,
        })
    }
}
