//! In-memory ledger for integration tests: toy ERC-20 tokens, WETH, and a vault/strategy
//! pair with just enough accounting to exercise the harness end to end.
#![allow(dead_code)]

use alloy::primitives::{address, keccak256, Address, Bytes, U256};
use alloy::sol_types::{SolCall, SolInterface, SolValue};
use std::collections::{BTreeMap, HashMap};
use vault_harness::adapter::{
    Artifact, ChainAdapter, Receipt, SimulatedClock, SnapshotId, TxRequest, UnlockedAccounts,
};
use vault_harness::contracts::{IStrategy, IStrategyViews, IVault, IERC20, IWETH};
use vault_harness::error::AdapterError;
use vault_harness::fixture::{FixtureConfig, FixtureInputs};
use vault_harness::funding::ReserveBook;
use vault_harness::identity::{derive_pool_accounts, Identity};

pub const WANT: Address = address!("0000000000000000000000000000000000001001");
pub const WETH: Address = address!("0000000000000000000000000000000000001002");
pub const DAI: Address = address!("0000000000000000000000000000000000001003");
pub const WANT_RESERVE: Address = address!("0000000000000000000000000000000000002001");

pub const BLOCK_TIME_SECS: u64 = 12;
pub const GENESIS_TIMESTAMP: u64 = 1_700_000_000;
/// Locked vault profit fully unlocks after this long.
pub const PROFIT_DEGRADATION_SECS: u64 = 21_600;
const MAX_BPS: u64 = 10_000;
const POOL_SIZE: usize = 10;

fn ether(whole: u64) -> U256 {
    U256::from(whole) * U256::from(10u64).pow(U256::from(18u64))
}

fn bare_revert() -> AdapterError {
    AdapterError::Revert {
        reason: None,
        data: Bytes::new(),
    }
}

fn require(condition: bool, reason: &str) -> Result<(), AdapterError> {
    if condition {
        Ok(())
    } else {
        Err(AdapterError::revert(reason))
    }
}

pub fn vault_artifact() -> Artifact {
    Artifact::new("Vault", vec![0x60, 0x80, 0x01])
}

pub fn strategy_artifact() -> Artifact {
    Artifact::new("Strategy", vec![0x60, 0x80, 0x02])
}

pub fn fixture_inputs() -> FixtureInputs {
    FixtureInputs {
        want: WANT,
        wrapped_native: Some(WETH),
        protected: vec![DAI],
        vault_artifact: vault_artifact(),
        strategy_artifact: strategy_artifact(),
        config: FixtureConfig::default(),
    }
}

pub fn reserve_book() -> ReserveBook {
    ReserveBook::new([(WANT, WANT_RESERVE)])
}

/// Knobs for the toy contracts.
#[derive(Debug, Clone)]
pub struct MockBehavior {
    /// Yield credited to the strategy on every harvest, in bps of its want balance.
    pub harvest_profit_bps: u64,
    /// When false, `sweep` forgets to refuse want.
    pub guard_sweep_want: bool,
    /// Every adapter request after this many fails as a transport error.
    pub transport_failure_after: Option<u64>,
    /// Whether the strategy answers `balanceOfWant` / `balanceOfStake`.
    pub balance_views: bool,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            harvest_profit_bps: 0,
            guard_sweep_want: true,
            transport_failure_after: None,
            balance_views: true,
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    symbol: String,
    decimals: u8,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
}

impl Token {
    fn new(symbol: &str, decimals: u8) -> Self {
        Self {
            symbol: symbol.to_string(),
            decimals,
            balances: HashMap::new(),
            allowances: HashMap::new(),
        }
    }

    fn balance(&self, owner: Address) -> U256 {
        self.balances.get(&owner).copied().unwrap_or_default()
    }

    fn mint(&mut self, to: Address, amount: U256) {
        *self.balances.entry(to).or_default() += amount;
    }

    fn move_balance(&mut self, from: Address, to: Address, amount: U256) -> Result<(), AdapterError> {
        let available = self.balance(from);
        require(available >= amount, "ERC20: transfer amount exceeds balance")?;
        self.balances.insert(from, available - amount);
        *self.balances.entry(to).or_default() += amount;
        Ok(())
    }

    fn spend_allowance(&mut self, owner: Address, spender: Address, amount: U256) -> Result<(), AdapterError> {
        let allowed = self
            .allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default();
        require(allowed >= amount, "ERC20: insufficient allowance")?;
        if allowed != U256::MAX {
            self.allowances.insert((owner, spender), allowed - amount);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct StrategyParams {
    debt_ratio: U256,
    total_debt: U256,
    rate_limit: U256,
}

#[derive(Debug, Clone, Default)]
struct Vault {
    initialized: bool,
    token: Address,
    governance: Address,
    management: Address,
    guardian: Address,
    rewards: Address,
    deposit_limit: U256,
    debt_ratio: U256,
    total_debt: U256,
    strategies: BTreeMap<Address, StrategyParams>,
    shares: HashMap<Address, U256>,
    total_supply: U256,
    locked_profit: U256,
    last_report: u64,
}

#[derive(Debug, Clone)]
struct Strategy {
    vault: Address,
    want: Address,
    strategist: Address,
    keeper: Address,
    emergency_exit: bool,
}

#[derive(Debug, Clone)]
struct MockState {
    tokens: HashMap<Address, Token>,
    vaults: HashMap<Address, Vault>,
    strategies: HashMap<Address, Strategy>,
    native: HashMap<Address, U256>,
    protected: Vec<Address>,
    clock: SimulatedClock,
    nonce: u64,
}

impl MockState {
    fn token_mut(&mut self, token: Address) -> Result<&mut Token, AdapterError> {
        self.tokens.get_mut(&token).ok_or_else(bare_revert)
    }

    fn balance(&self, token: Address, owner: Address) -> U256 {
        self.tokens
            .get(&token)
            .map(|t| t.balance(owner))
            .unwrap_or_default()
    }

    fn move_token(&mut self, token: Address, from: Address, to: Address, amount: U256) -> Result<(), AdapterError> {
        self.token_mut(token)?.move_balance(from, to, amount)
    }

    fn vault(&self, vault: Address) -> Result<&Vault, AdapterError> {
        self.vaults.get(&vault).ok_or_else(bare_revert)
    }

    fn vault_mut(&mut self, vault: Address) -> Result<&mut Vault, AdapterError> {
        self.vaults.get_mut(&vault).ok_or_else(bare_revert)
    }

    fn locked_profit(&self, vault: &Vault) -> U256 {
        let elapsed = self.clock.timestamp.saturating_sub(vault.last_report);
        if elapsed >= PROFIT_DEGRADATION_SECS {
            return U256::ZERO;
        }
        vault.locked_profit * U256::from(PROFIT_DEGRADATION_SECS - elapsed)
            / U256::from(PROFIT_DEGRADATION_SECS)
    }

    fn total_assets(&self, vault_addr: Address) -> Result<U256, AdapterError> {
        let vault = self.vault(vault_addr)?;
        Ok(self.balance(vault.token, vault_addr) + vault.total_debt)
    }

    fn free_funds(&self, vault_addr: Address) -> Result<U256, AdapterError> {
        let vault = self.vault(vault_addr)?;
        Ok(self
            .total_assets(vault_addr)?
            .saturating_sub(self.locked_profit(vault)))
    }

    fn price_per_share(&self, vault_addr: Address) -> Result<U256, AdapterError> {
        let vault = self.vault(vault_addr)?;
        let decimals = self.tokens.get(&vault.token).map(|t| t.decimals).unwrap_or(18);
        let unit = U256::from(10u64).pow(U256::from(decimals));
        if vault.total_supply.is_zero() {
            return Ok(unit);
        }
        Ok(unit * self.free_funds(vault_addr)? / vault.total_supply)
    }

    fn dispatch(
        &mut self,
        behavior: &MockBehavior,
        caller: Address,
        to: Address,
        data: &[u8],
        value: U256,
    ) -> Result<Vec<u8>, AdapterError> {
        if !value.is_zero() {
            let available = self.native.get(&caller).copied().unwrap_or_default();
            require(available >= value, "insufficient funds for transfer")?;
            self.native.insert(caller, available - value);
            *self.native.entry(to).or_default() += value;
        }
        if to == WETH && (data.is_empty() || data.starts_with(&IWETH::depositCall::SELECTOR)) {
            self.token_mut(WETH)?.mint(caller, value);
            return Ok(Vec::new());
        }
        if self.vaults.contains_key(&to) {
            return self.vault_call(caller, to, data);
        }
        if self.strategies.contains_key(&to) {
            return self.strategy_call(behavior, caller, to, data);
        }
        if self.tokens.contains_key(&to) {
            return self.token_call(caller, to, data);
        }
        // Externally owned account.
        Ok(Vec::new())
    }

    fn token_call(&mut self, caller: Address, to: Address, data: &[u8]) -> Result<Vec<u8>, AdapterError> {
        let call = IERC20::IERC20Calls::abi_decode(data, true).map_err(|_| bare_revert())?;
        let token = self.token_mut(to)?;
        Ok(match call {
            IERC20::IERC20Calls::decimals(_) => {
                IERC20::decimalsCall::abi_encode_returns(&(token.decimals,))
            }
            IERC20::IERC20Calls::symbol(_) => {
                IERC20::symbolCall::abi_encode_returns(&(token.symbol.clone(),))
            }
            IERC20::IERC20Calls::balanceOf(c) => {
                IERC20::balanceOfCall::abi_encode_returns(&(token.balance(c.owner),))
            }
            IERC20::IERC20Calls::transfer(c) => {
                token.move_balance(caller, c.to, c.amount)?;
                IERC20::transferCall::abi_encode_returns(&(true,))
            }
            IERC20::IERC20Calls::approve(c) => {
                token.allowances.insert((caller, c.spender), c.amount);
                IERC20::approveCall::abi_encode_returns(&(true,))
            }
        })
    }

    fn vault_call(&mut self, caller: Address, to: Address, data: &[u8]) -> Result<Vec<u8>, AdapterError> {
        let call = IVault::IVaultCalls::abi_decode(data, true).map_err(|_| bare_revert())?;
        let governance = self.vault(to)?.governance;
        match call {
            IVault::IVaultCalls::initialize(c) => {
                let now = self.clock.timestamp;
                let vault = self.vault_mut(to)?;
                require(!vault.initialized, "already initialized")?;
                vault.initialized = true;
                vault.token = c.token;
                vault.governance = c.governance;
                vault.management = c.governance;
                vault.rewards = c.rewards;
                vault.guardian = c.guardian;
                vault.last_report = now;
                Ok(Vec::new())
            }
            IVault::IVaultCalls::setDepositLimit(c) => {
                require(caller == governance, "!authorized")?;
                self.vault_mut(to)?.deposit_limit = c.limit;
                Ok(Vec::new())
            }
            IVault::IVaultCalls::setManagement(c) => {
                require(caller == governance, "!authorized")?;
                self.vault_mut(to)?.management = c.management;
                Ok(Vec::new())
            }
            IVault::IVaultCalls::addStrategy(c) => {
                require(caller == governance, "!authorized")?;
                let attached = self.strategies.get(&c.strategy).map(|s| s.vault);
                require(attached == Some(to), "!vault")?;
                let vault = self.vault_mut(to)?;
                require(!vault.strategies.contains_key(&c.strategy), "!activated")?;
                let total = vault.debt_ratio + c.debtRatio;
                require(total <= U256::from(MAX_BPS), "!debtRatio")?;
                vault.debt_ratio = total;
                vault.strategies.insert(
                    c.strategy,
                    StrategyParams {
                        debt_ratio: c.debtRatio,
                        total_debt: U256::ZERO,
                        rate_limit: c.rateLimit,
                    },
                );
                Ok(Vec::new())
            }
            IVault::IVaultCalls::updateStrategyDebtRatio(c) => {
                let vault = self.vault_mut(to)?;
                require(
                    caller == vault.governance || caller == vault.management,
                    "!authorized",
                )?;
                let previous = vault
                    .strategies
                    .get(&c.strategy)
                    .map(|p| p.debt_ratio)
                    .ok_or_else(|| AdapterError::revert("!activated"))?;
                let total = vault.debt_ratio - previous + c.debtRatio;
                require(total <= U256::from(MAX_BPS), "!debtRatio")?;
                vault.debt_ratio = total;
                if let Some(params) = vault.strategies.get_mut(&c.strategy) {
                    params.debt_ratio = c.debtRatio;
                }
                Ok(Vec::new())
            }
            IVault::IVaultCalls::deposit(c) => {
                let vault = self.vault(to)?.clone();
                require(vault.initialized, "!initialized")?;
                let amount = if c.amount == U256::MAX {
                    self.balance(vault.token, caller)
                } else {
                    c.amount
                };
                require(!amount.is_zero(), "zero deposit")?;
                let total = self.total_assets(to)?;
                require(
                    total.saturating_add(amount) <= vault.deposit_limit,
                    "Vault exceeded deposit limit",
                )?;
                let free = self.free_funds(to)?;
                let shares = if vault.total_supply.is_zero() || free.is_zero() {
                    amount
                } else {
                    amount * vault.total_supply / free
                };
                let token = self.token_mut(vault.token)?;
                token.spend_allowance(caller, to, amount)?;
                token.move_balance(caller, to, amount)?;
                let vault = self.vault_mut(to)?;
                *vault.shares.entry(caller).or_default() += shares;
                vault.total_supply += shares;
                Ok(IVault::depositCall::abi_encode_returns(&(shares,)))
            }
            IVault::IVaultCalls::withdraw(c) => {
                let vault = self.vault(to)?.clone();
                let held = vault.shares.get(&caller).copied().unwrap_or_default();
                let shares = c.maxShares.min(held);
                require(!shares.is_zero(), "no shares")?;
                let mut value = shares * self.free_funds(to)? / vault.total_supply;
                let idle = self.balance(vault.token, to);
                if value > idle {
                    self.pull_from_strategies(to, value - idle)?;
                    value = value.min(self.balance(vault.token, to));
                }
                let vault_state = self.vault_mut(to)?;
                vault_state.shares.insert(caller, held - shares);
                vault_state.total_supply -= shares;
                self.move_token(vault.token, to, caller, value)?;
                Ok(IVault::withdrawCall::abi_encode_returns(&(value,)))
            }
            IVault::IVaultCalls::pricePerShare(_) => Ok(
                IVault::pricePerShareCall::abi_encode_returns(&(self.price_per_share(to)?,)),
            ),
            IVault::IVaultCalls::totalAssets(_) => Ok(IVault::totalAssetsCall::abi_encode_returns(
                &(self.total_assets(to)?,),
            )),
            IVault::IVaultCalls::debtRatio(_) => Ok(IVault::debtRatioCall::abi_encode_returns(&(
                self.vault(to)?.debt_ratio,
            ))),
            IVault::IVaultCalls::balanceOf(c) => {
                let shares = self
                    .vault(to)?
                    .shares
                    .get(&c.owner)
                    .copied()
                    .unwrap_or_default();
                Ok(IVault::balanceOfCall::abi_encode_returns(&(shares,)))
            }
            IVault::IVaultCalls::token(_) => Ok(IVault::tokenCall::abi_encode_returns(&(
                self.vault(to)?.token,
            ))),
        }
    }

    fn pull_from_strategies(&mut self, vault_addr: Address, mut needed: U256) -> Result<(), AdapterError> {
        let vault = self.vault(vault_addr)?.clone();
        for (strategy, params) in &vault.strategies {
            if needed.is_zero() {
                break;
            }
            let available = self.balance(vault.token, *strategy);
            let amount = needed.min(available).min(params.total_debt);
            if amount.is_zero() {
                continue;
            }
            self.move_token(vault.token, *strategy, vault_addr, amount)?;
            let vault = self.vault_mut(vault_addr)?;
            vault.total_debt = vault.total_debt.saturating_sub(amount);
            if let Some(p) = vault.strategies.get_mut(strategy) {
                p.total_debt = p.total_debt.saturating_sub(amount);
            }
            needed -= amount;
        }
        Ok(())
    }

    fn strategy_call(
        &mut self,
        behavior: &MockBehavior,
        caller: Address,
        to: Address,
        data: &[u8],
    ) -> Result<Vec<u8>, AdapterError> {
        let strategy = self.strategies.get(&to).cloned().ok_or_else(bare_revert)?;
        if let Ok(view) = IStrategyViews::IStrategyViewsCalls::abi_decode(data, true) {
            if !behavior.balance_views {
                return Err(bare_revert());
            }
            return Ok(match view {
                IStrategyViews::IStrategyViewsCalls::balanceOfWant(_) => {
                    IStrategyViews::balanceOfWantCall::abi_encode_returns(&(self.balance(
                        strategy.want,
                        to,
                    ),))
                }
                IStrategyViews::IStrategyViewsCalls::balanceOfStake(_) => {
                    IStrategyViews::balanceOfStakeCall::abi_encode_returns(&(U256::ZERO,))
                }
            });
        }
        let call = IStrategy::IStrategyCalls::abi_decode(data, true).map_err(|_| bare_revert())?;
        let vault = self.vault(strategy.vault)?.clone();
        let governance = vault.governance;
        let keeper_like = caller == strategy.keeper
            || caller == strategy.strategist
            || caller == governance
            || caller == vault.management;
        let strategist_like = caller == strategy.strategist || caller == governance;
        match call {
            IStrategy::IStrategyCalls::want(_) => {
                Ok(IStrategy::wantCall::abi_encode_returns(&(strategy.want,)))
            }
            IStrategy::IStrategyCalls::vault(_) => {
                Ok(IStrategy::vaultCall::abi_encode_returns(&(strategy.vault,)))
            }
            IStrategy::IStrategyCalls::setKeeper(c) => {
                require(strategist_like, "!authorized")?;
                if let Some(s) = self.strategies.get_mut(&to) {
                    s.keeper = c.keeper;
                }
                Ok(Vec::new())
            }
            IStrategy::IStrategyCalls::harvest(_) => {
                require(keeper_like, "!authorized")?;
                self.harvest(behavior, to)?;
                Ok(Vec::new())
            }
            IStrategy::IStrategyCalls::tend(_) => {
                require(keeper_like, "!authorized")?;
                Ok(Vec::new())
            }
            IStrategy::IStrategyCalls::sweep(c) => {
                require(caller == governance, "!authorized")?;
                if behavior.guard_sweep_want {
                    require(c.token != strategy.want, "!want")?;
                }
                require(c.token != strategy.vault, "!shares")?;
                require(!self.protected.contains(&c.token), "!protected")?;
                let balance = self.balance(c.token, to);
                self.move_token(c.token, to, governance, balance)?;
                Ok(Vec::new())
            }
            IStrategy::IStrategyCalls::setEmergencyExit(_) => {
                require(strategist_like, "!authorized")?;
                if let Some(s) = self.strategies.get_mut(&to) {
                    s.emergency_exit = true;
                }
                let vault = self.vault_mut(strategy.vault)?;
                if let Some(previous) = vault.strategies.get(&to).map(|p| p.debt_ratio) {
                    vault.debt_ratio -= previous;
                    if let Some(params) = vault.strategies.get_mut(&to) {
                        params.debt_ratio = U256::ZERO;
                    }
                }
                Ok(Vec::new())
            }
            IStrategy::IStrategyCalls::estimatedTotalAssets(_) => Ok(
                IStrategy::estimatedTotalAssetsCall::abi_encode_returns(&(self.balance(
                    strategy.want,
                    to,
                ),)),
            ),
            IStrategy::IStrategyCalls::harvestTrigger(_) => {
                let (target, debt) = self.debt_target(strategy.vault, to)?;
                Ok(IStrategy::harvestTriggerCall::abi_encode_returns(&(target != debt,)))
            }
            IStrategy::IStrategyCalls::tendTrigger(_) => {
                Ok(IStrategy::tendTriggerCall::abi_encode_returns(&(false,)))
            }
        }
    }

    /// `(target debt, current debt)` for a strategy under its vault's debt ratio.
    fn debt_target(&self, vault_addr: Address, strategy: Address) -> Result<(U256, U256), AdapterError> {
        let params = self
            .vault(vault_addr)?
            .strategies
            .get(&strategy)
            .cloned()
            .ok_or_else(|| AdapterError::revert("!activated"))?;
        let target = self.total_assets(vault_addr)? * params.debt_ratio / U256::from(MAX_BPS);
        Ok((target, params.total_debt))
    }

    fn harvest(&mut self, behavior: &MockBehavior, strategy_addr: Address) -> Result<(), AdapterError> {
        let strategy = self.strategies.get(&strategy_addr).cloned().ok_or_else(bare_revert)?;
        let vault_addr = strategy.vault;
        let want = strategy.want;
        let (_, debt) = self.debt_target(vault_addr, strategy_addr)?;

        let balance = self.balance(want, strategy_addr);
        if !strategy.emergency_exit && behavior.harvest_profit_bps > 0 && !balance.is_zero() {
            let accrued = balance * U256::from(behavior.harvest_profit_bps) / U256::from(MAX_BPS);
            self.token_mut(want)?.mint(strategy_addr, accrued);
        }
        let gain = if strategy.emergency_exit {
            U256::ZERO
        } else {
            self.balance(want, strategy_addr).saturating_sub(debt)
        };
        if !gain.is_zero() {
            self.move_token(want, strategy_addr, vault_addr, gain)?;
        }
        let now = self.clock.timestamp;
        let locked = self.locked_profit(self.vault(vault_addr)?);
        let vault = self.vault_mut(vault_addr)?;
        vault.locked_profit = locked + gain;
        vault.last_report = now;

        let (target, debt) = self.debt_target(vault_addr, strategy_addr)?;
        let new_debt = if target > debt {
            let credit = (target - debt).min(self.balance(want, vault_addr));
            self.move_token(want, vault_addr, strategy_addr, credit)?;
            debt + credit
        } else {
            let payment = (debt - target).min(self.balance(want, strategy_addr));
            self.move_token(want, strategy_addr, vault_addr, payment)?;
            debt - payment
        };
        let vault = self.vault_mut(vault_addr)?;
        vault.total_debt = vault.total_debt - debt + new_debt;
        if let Some(params) = vault.strategies.get_mut(&strategy_addr) {
            params.total_debt = new_debt;
        }
        Ok(())
    }
}

pub struct MockChain {
    state: MockState,
    unlocked: UnlockedAccounts,
    behavior: MockBehavior,
    snapshots: HashMap<u64, MockState>,
    next_snapshot: u64,
    requests: u64,
}

impl MockChain {
    pub fn new() -> Self {
        Self::with_behavior(MockBehavior::default())
    }

    pub fn with_behavior(behavior: MockBehavior) -> Self {
        let pool = derive_pool_accounts(POOL_SIZE);
        let mut tokens = HashMap::new();
        let mut want = Token::new("YFI", 18);
        want.mint(WANT_RESERVE, ether(1_000_000));
        tokens.insert(WANT, want);
        tokens.insert(WETH, Token::new("WETH", 18));
        tokens.insert(DAI, Token::new("DAI", 18));
        let native = pool.iter().map(|a| (*a, ether(100))).collect();
        Self {
            state: MockState {
                tokens,
                vaults: HashMap::new(),
                strategies: HashMap::new(),
                native,
                protected: vec![DAI],
                clock: SimulatedClock::starting_at(1, GENESIS_TIMESTAMP),
                nonce: 0,
            },
            unlocked: UnlockedAccounts::new(pool, true),
            behavior,
            snapshots: HashMap::new(),
            next_snapshot: 0,
            requests: 0,
        }
    }

    /// Same ledger, but impersonation is refused.
    pub fn production() -> Self {
        let mut chain = Self::new();
        chain.unlocked = UnlockedAccounts::new(chain.unlocked.pool().to_vec(), false);
        chain
    }

    pub fn behavior_mut(&mut self) -> &mut MockBehavior {
        &mut self.behavior
    }

    pub fn token_balance(&self, token: Address, owner: Address) -> U256 {
        self.state.balance(token, owner)
    }

    pub fn set_token_balance(&mut self, token: Address, owner: Address, amount: U256) {
        if let Some(t) = self.state.tokens.get_mut(&token) {
            t.balances.insert(owner, amount);
        }
    }

    pub fn deployed_vaults(&self) -> usize {
        self.state.vaults.len()
    }

    fn tick(&mut self) -> Result<(), AdapterError> {
        self.requests += 1;
        match self.behavior.transport_failure_after {
            Some(limit) if self.requests > limit => Err(AdapterError::Transport(
                "mock connection reset".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn receipt(&mut self, label: &str, contract_address: Option<Address>) -> Receipt {
        self.state.nonce += 1;
        Receipt {
            label: label.to_string(),
            tx_hash: keccak256(self.state.nonce.to_be_bytes()),
            block_number: self.state.clock.block_number,
            gas_used: 21_000,
            contract_address,
        }
    }
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainAdapter for MockChain {
    fn accounts(&self) -> &[Address] {
        self.unlocked.pool()
    }

    fn deploy(
        &mut self,
        artifact: &Artifact,
        deployer: &Identity,
        constructor_args: &[u8],
    ) -> Result<Address, AdapterError> {
        self.tick()?;
        self.unlocked.authorize(deployer)?;
        self.state.clock.mine(1, BLOCK_TIME_SECS);
        let address = deployer.address.create(self.state.nonce);
        match artifact.name.as_str() {
            "Vault" => {
                self.state.vaults.insert(address, Vault::default());
            }
            "Strategy" => {
                let vault = Address::abi_decode(constructor_args, true).map_err(|err| {
                    AdapterError::Deploy {
                        artifact: artifact.name.clone(),
                        reason: err.to_string(),
                    }
                })?;
                let want = self
                    .state
                    .vaults
                    .get(&vault)
                    .map(|v| v.token)
                    .ok_or_else(|| AdapterError::Deploy {
                        artifact: artifact.name.clone(),
                        reason: "constructor reverted".to_string(),
                    })?;
                self.state.strategies.insert(
                    address,
                    Strategy {
                        vault,
                        want,
                        strategist: deployer.address,
                        keeper: deployer.address,
                        emergency_exit: false,
                    },
                );
            }
            other => {
                return Err(AdapterError::Deploy {
                    artifact: other.to_string(),
                    reason: "constructor reverted".to_string(),
                })
            }
        }
        self.receipt(&format!("deploy({})", artifact.name), Some(address));
        Ok(address)
    }

    fn call(&mut self, target: Address, data: Bytes) -> Result<Bytes, AdapterError> {
        self.tick()?;
        let mut scratch = self.state.clone();
        scratch
            .dispatch(&self.behavior, Address::ZERO, target, &data, U256::ZERO)
            .map(Bytes::from)
    }

    fn transact(&mut self, sender: &Identity, tx: TxRequest) -> Result<Receipt, AdapterError> {
        self.tick()?;
        self.unlocked.authorize(sender)?;
        let to = tx.to.ok_or_else(|| AdapterError::Backend("use deploy for creates".into()))?;
        self.state.clock.mine(1, BLOCK_TIME_SECS);
        let mut next = self.state.clone();
        next.dispatch(&self.behavior, sender.address, to, &tx.data, tx.value)?;
        self.state = next;
        Ok(self.receipt(&tx.label, None))
    }

    fn native_balance(&mut self, owner: Address) -> Result<U256, AdapterError> {
        self.tick()?;
        Ok(self.state.native.get(&owner).copied().unwrap_or_default())
    }

    fn impersonate(&mut self, address: Address) -> Result<Identity, AdapterError> {
        self.tick()?;
        self.unlocked.impersonate(address)
    }

    fn advance_time(&mut self, seconds: u64) -> Result<(), AdapterError> {
        self.tick()?;
        self.state.clock.advance_time(seconds);
        Ok(())
    }

    fn mine_blocks(&mut self, blocks: u64) -> Result<(), AdapterError> {
        self.tick()?;
        self.state.clock.mine(blocks, BLOCK_TIME_SECS);
        Ok(())
    }

    fn clock(&self) -> SimulatedClock {
        self.state.clock
    }

    fn snapshot(&mut self) -> Result<SnapshotId, AdapterError> {
        self.tick()?;
        let id = self.next_snapshot;
        self.next_snapshot += 1;
        self.snapshots.insert(id, self.state.clone());
        Ok(SnapshotId(id))
    }

    fn revert_to(&mut self, id: SnapshotId) -> Result<(), AdapterError> {
        self.tick()?;
        let state = self
            .snapshots
            .remove(&id.0)
            .ok_or(AdapterError::UnknownSnapshot(id.0))?;
        self.snapshots.retain(|other, _| *other < id.0);
        self.state = state;
        Ok(())
    }
}
