//! Memoized, dependency-ordered construction of the system under test.
//!
//! `Identities -> Assets -> Funding -> Vault -> Strategy`. Requesting a node builds whatever
//! it depends on first; every node is built at most once per graph, and a fresh graph is
//! built for every scenario.

use crate::adapter::{Artifact, ChainAdapter};
use crate::asset::Asset;
use crate::contracts::{send, IStrategy, IVault};
use crate::error::SetupError;
use crate::funding::{fund, ReserveBook};
use crate::identity::{Identity, IdentityRegistry, Role};
use crate::utils::constants::{DEFAULT_PROFIT_UNLOCK_SECS, DEFAULT_RATE_LIMIT_BPS, MAX_BPS};
use alloy::primitives::{Address, U256};
use alloy::sol_types::SolValue;
use serde::Serialize;
use std::collections::BTreeMap;

/// Parameters handed to the vault and strategy during setup.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureConfig {
    pub deposit_limit: U256,
    pub debt_ratio_bps: u16,
    pub min_debt_per_harvest: U256,
    pub max_debt_per_harvest: U256,
    pub rate_limit_bps: u16,
    pub profit_unlock_secs: u64,
    /// Whole want units funded to `Depositor(i)`.
    pub depositor_units: Vec<u64>,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            deposit_limit: U256::MAX,
            debt_ratio_bps: MAX_BPS,
            min_debt_per_harvest: U256::ZERO,
            max_debt_per_harvest: U256::MAX,
            rate_limit_bps: DEFAULT_RATE_LIMIT_BPS,
            profit_unlock_secs: DEFAULT_PROFIT_UNLOCK_SECS,
            depositor_units: vec![1_000, 2_170, 2_170],
        }
    }
}

/// Everything a session knows about the system before any node is built.
#[derive(Debug, Clone)]
pub struct FixtureInputs {
    pub want: Address,
    pub wrapped_native: Option<Address>,
    pub protected: Vec<Address>,
    pub vault_artifact: Artifact,
    pub strategy_artifact: Artifact,
    pub config: FixtureConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum FixtureNode {
    Identities,
    Assets,
    Funding,
    Vault,
    Strategy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemUnderTest {
    pub vault: Address,
    pub strategy: Address,
    pub want: Asset,
}

#[derive(Debug, Clone)]
struct Assets {
    want: Asset,
    wrapped_native: Option<Asset>,
    protected: Vec<Asset>,
}

/// Built fixture handed to the scenario runner.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub sut: SystemUnderTest,
    pub identities: BTreeMap<Role, Identity>,
    /// Want amount funded per depositor index.
    pub funded: BTreeMap<u8, U256>,
    pub wrapped_native: Option<Asset>,
    pub protected: Vec<Asset>,
    pub config: FixtureConfig,
    pub trace: Vec<FixtureNode>,
}

impl Fixture {
    pub fn identity(&self, role: Role) -> Option<Identity> {
        self.identities.get(&role).copied()
    }

    pub fn funded(&self, depositor: u8) -> Option<U256> {
        self.funded.get(&depositor).copied()
    }

    pub fn funded_total(&self) -> U256 {
        self.funded.values().fold(U256::ZERO, |acc, v| acc.saturating_add(*v))
    }
}

pub struct FixtureGraph<'a, A: ChainAdapter + ?Sized> {
    adapter: &'a mut A,
    registry: &'a mut IdentityRegistry,
    reserves: &'a ReserveBook,
    inputs: &'a FixtureInputs,
    identities: Option<BTreeMap<Role, Identity>>,
    assets: Option<Assets>,
    funded: Option<BTreeMap<u8, U256>>,
    vault: Option<Address>,
    strategy: Option<Address>,
    trace: Vec<FixtureNode>,
}

impl<'a, A: ChainAdapter + ?Sized> FixtureGraph<'a, A> {
    pub fn new(
        adapter: &'a mut A,
        registry: &'a mut IdentityRegistry,
        reserves: &'a ReserveBook,
        inputs: &'a FixtureInputs,
    ) -> Self {
        Self {
            adapter,
            registry,
            reserves,
            inputs,
            identities: None,
            assets: None,
            funded: None,
            vault: None,
            strategy: None,
            trace: Vec::new(),
        }
    }

    pub fn trace(&self) -> &[FixtureNode] {
        &self.trace
    }

    fn record(&mut self, node: FixtureNode) {
        tracing::debug!("[FIXTURE] Built {:?}", node);
        self.trace.push(node);
    }

    pub fn identities(&mut self) -> Result<BTreeMap<Role, Identity>, SetupError> {
        if let Some(identities) = &self.identities {
            return Ok(identities.clone());
        }
        let mut roles = vec![
            Role::Governance,
            Role::Rewards,
            Role::Guardian,
            Role::Management,
            Role::Strategist,
            Role::Keeper,
        ];
        let depositors = u8::try_from(self.inputs.config.depositor_units.len()).map_err(|_| {
            SetupError::PoolExhausted {
                role: "depositor".to_string(),
                slot: self.inputs.config.depositor_units.len(),
                pool_len: self.registry.pool_len(),
            }
        })?;
        roles.extend((0..depositors).map(Role::Depositor));

        let mut identities = BTreeMap::new();
        for role in roles {
            identities.insert(role, self.registry.allocate(role)?);
        }
        self.identities = Some(identities.clone());
        self.record(FixtureNode::Identities);
        Ok(identities)
    }

    fn assets(&mut self) -> Result<Assets, SetupError> {
        if let Some(assets) = &self.assets {
            return Ok(assets.clone());
        }
        self.identities()?;
        let attach = |adapter: &mut A, address: Address| {
            Asset::attach(adapter, address)
                .map_err(|err| SetupError::adapter(format!("attach asset {address:?}"), err))
        };
        let want = attach(&mut *self.adapter, self.inputs.want)?;
        let wrapped_native = match self.inputs.wrapped_native {
            Some(address) => Some(attach(&mut *self.adapter, address)?),
            None => None,
        };
        let protected = self
            .inputs
            .protected
            .iter()
            .map(|address| attach(&mut *self.adapter, *address))
            .collect::<Result<Vec<_>, _>>()?;
        let assets = Assets {
            want,
            wrapped_native,
            protected,
        };
        self.assets = Some(assets.clone());
        self.record(FixtureNode::Assets);
        Ok(assets)
    }

    fn funding(&mut self) -> Result<BTreeMap<u8, U256>, SetupError> {
        if let Some(funded) = &self.funded {
            return Ok(funded.clone());
        }
        let identities = self.identities()?;
        let want = self.assets()?.want;
        let inputs = self.inputs;
        let mut funded = BTreeMap::new();
        for (index, whole) in inputs.config.depositor_units.iter().enumerate() {
            let depositor = u8::try_from(index).unwrap_or(u8::MAX);
            let Some(recipient) = identities.get(&Role::Depositor(depositor)) else {
                continue;
            };
            let amount = want.units(*whole);
            fund(self.adapter, self.reserves, recipient, &want, amount)?;
            funded.insert(depositor, amount);
        }
        self.funded = Some(funded.clone());
        self.record(FixtureNode::Funding);
        Ok(funded)
    }

    pub fn vault(&mut self) -> Result<Address, SetupError> {
        if let Some(vault) = self.vault {
            return Ok(vault);
        }
        let identities = self.identities()?;
        let want = self.assets()?.want;
        self.funding()?;
        let role = |role: Role| {
            identities
                .get(&role)
                .copied()
                .ok_or_else(|| SetupError::UnallocatableRole(role.to_string()))
        };
        let (gov, guardian) = (role(Role::Governance)?, role(Role::Guardian)?);
        let (rewards, management) = (role(Role::Rewards)?, role(Role::Management)?);
        let inputs = self.inputs;
        let config = &inputs.config;

        let vault = self
            .adapter
            .deploy(&inputs.vault_artifact, &guardian, &[])
            .map_err(|err| SetupError::adapter("deploy vault", err))?;
        send(
            self.adapter,
            &guardian,
            vault,
            &IVault::initializeCall {
                token: want.address,
                governance: gov.address,
                rewards: rewards.address,
                nameOverride: String::new(),
                symbolOverride: String::new(),
                guardian: guardian.address,
            },
        )
        .map_err(|err| SetupError::adapter("vault.initialize", err))?;
        send(
            self.adapter,
            &gov,
            vault,
            &IVault::setDepositLimitCall {
                limit: config.deposit_limit,
            },
        )
        .map_err(|err| SetupError::adapter("vault.setDepositLimit", err))?;
        send(
            self.adapter,
            &gov,
            vault,
            &IVault::setManagementCall {
                management: management.address,
            },
        )
        .map_err(|err| SetupError::adapter("vault.setManagement", err))?;

        tracing::info!("[FIXTURE] Vault for {} at {:?}", want.symbol, vault);
        self.vault = Some(vault);
        self.record(FixtureNode::Vault);
        Ok(vault)
    }

    pub fn strategy(&mut self) -> Result<Address, SetupError> {
        if let Some(strategy) = self.strategy {
            return Ok(strategy);
        }
        let vault = self.vault()?;
        let identities = self.identities()?;
        let role = |role: Role| {
            identities
                .get(&role)
                .copied()
                .ok_or_else(|| SetupError::UnallocatableRole(role.to_string()))
        };
        let (gov, strategist, keeper) = (
            role(Role::Governance)?,
            role(Role::Strategist)?,
            role(Role::Keeper)?,
        );
        let inputs = self.inputs;
        let config = &inputs.config;

        let strategy = self
            .adapter
            .deploy(&inputs.strategy_artifact, &strategist, &vault.abi_encode())
            .map_err(|err| SetupError::adapter("deploy strategy", err))?;
        send(
            self.adapter,
            &strategist,
            strategy,
            &IStrategy::setKeeperCall {
                keeper: keeper.address,
            },
        )
        .map_err(|err| SetupError::adapter("strategy.setKeeper", err))?;
        send(
            self.adapter,
            &gov,
            vault,
            &IVault::addStrategyCall {
                strategy,
                debtRatio: U256::from(config.debt_ratio_bps),
                minDebtPerHarvest: config.min_debt_per_harvest,
                maxDebtPerHarvest: config.max_debt_per_harvest,
                rateLimit: U256::from(config.rate_limit_bps),
            },
        )
        .map_err(|err| SetupError::adapter("vault.addStrategy", err))?;

        tracing::info!("[FIXTURE] Strategy at {:?} attached to vault {:?}", strategy, vault);
        self.strategy = Some(strategy);
        self.record(FixtureNode::Strategy);
        Ok(strategy)
    }

    /// Build the full graph and hand back the fixture.
    pub fn build(mut self) -> Result<Fixture, SetupError> {
        let strategy = self.strategy()?;
        let vault = self.vault()?;
        let assets = self.assets()?;
        let funded = self.funding()?;
        let identities = self.identities()?;
        Ok(Fixture {
            sut: SystemUnderTest {
                vault,
                strategy,
                want: assets.want,
            },
            identities,
            funded,
            wrapped_native: assets.wrapped_native,
            protected: assets.protected,
            config: self.inputs.config.clone(),
            trace: self.trace,
        })
    }
}
