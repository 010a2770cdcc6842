use super::step::{
    AssetRef, Expect, Holder, Operation, Predicate, Probe, Quantity, Query, Step, WithdrawAmount,
};
use super::Scenario;
use crate::adapter::{ChainAdapter, Receipt, TxRequest};
use crate::asset::Asset;
use crate::checker;
use crate::contracts::{read, read_optional, send, IStrategy, IStrategyViews, IVault, IWETH};
use crate::error::{AdapterError, AssertionFailure, StepError, StepFailure};
use crate::fixture::Fixture;
use crate::identity::{Identity, Role};
use crate::utils::constants::{DEFAULT_RELATIVE_APPROX, MAX_BPS};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolCall;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSettings {
    pub relative_approx: f64,
    /// Re-check `vault.debtRatio <= 10_000` after every mutating step.
    pub check_debt_ratio: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            relative_approx: DEFAULT_RELATIVE_APPROX,
            check_debt_ratio: true,
        }
    }
}

/// What an `Inspect` step logs about the strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyDump {
    pub estimated_total_assets: U256,
    pub want_balance: U256,
    pub balance_of_want: Option<U256>,
    pub balance_of_stake: Option<U256>,
    pub protected: Vec<(String, U256)>,
    pub price_per_share: U256,
}

/// First failing step of a scenario; later steps were skipped.
#[derive(Debug, Clone)]
pub struct StepFailed {
    pub index: usize,
    pub step: String,
    pub error: StepError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Observed {
    Amount(U256),
    Address(Address),
}

/// Executes one scenario's steps, strictly in order, against a built fixture.
pub struct ScenarioRunner<'a, A: ChainAdapter + ?Sized> {
    adapter: &'a mut A,
    fixture: &'a Fixture,
    settings: RunSettings,
    recorded: BTreeMap<String, U256>,
    steps_run: usize,
}

impl<'a, A: ChainAdapter + ?Sized> ScenarioRunner<'a, A> {
    pub fn new(adapter: &'a mut A, fixture: &'a Fixture, settings: RunSettings) -> Self {
        Self {
            adapter,
            fixture,
            settings,
            recorded: BTreeMap::new(),
            steps_run: 0,
        }
    }

    pub fn recorded(&self) -> &BTreeMap<String, U256> {
        &self.recorded
    }

    pub fn steps_run(&self) -> usize {
        self.steps_run
    }

    pub fn run(&mut self, scenario: &Scenario) -> Result<(), StepFailed> {
        for (index, step) in scenario.steps.iter().enumerate() {
            tracing::debug!("[RUNNER] {} step {}: {:?}", scenario.name, index, step);
            let outcome = self.execute(step).and_then(|()| {
                if step.is_mutating() && self.settings.check_debt_ratio {
                    self.check_debt_ratio()
                } else {
                    Ok(())
                }
            });
            self.steps_run += 1;
            if let Err(error) = outcome {
                tracing::warn!(
                    "[RUNNER] {} failed at step {}: {}",
                    scenario.name,
                    index,
                    error
                );
                return Err(StepFailed {
                    index,
                    step: format!("{step:?}"),
                    error,
                });
            }
        }
        Ok(())
    }

    fn execute(&mut self, step: &Step) -> Result<(), StepError> {
        match step {
            Step::Transact { actor, op, expect } => {
                let sender = self.actor(*actor)?;
                let result = self.perform(&sender, op)?;
                match expect {
                    Expect::Success => checker::assert_succeeds(result).map(|_| ()),
                    Expect::Revert(reason) => checker::assert_reverts(result, reason),
                }
            }
            Step::Query(query) => self.query(*query),
            Step::AdvanceTime(seconds) => Ok(self.adapter.advance_time(*seconds)?),
            Step::MineBlocks(blocks) => Ok(self.adapter.mine_blocks(*blocks)?),
            Step::Record { key, probe } => {
                let value = self.observe_amount(probe)?;
                tracing::debug!("[RUNNER] Recorded {} = {}", key, value);
                self.recorded.insert(key.clone(), value);
                Ok(())
            }
            Step::Check { probe, predicate } => self.check(probe, predicate),
            Step::Inspect { label } => self.inspect(label),
        }
    }

    fn actor(&self, role: Role) -> Result<Identity, StepError> {
        self.fixture
            .identity(role)
            .ok_or_else(|| StepFailure::Rejected(format!("no identity allocated for {role}")).into())
    }

    fn asset(&self, asset: AssetRef) -> Result<Asset, StepError> {
        let missing = |what: String| StepError::from(StepFailure::Rejected(what));
        match asset {
            AssetRef::Want => Ok(self.fixture.sut.want.clone()),
            AssetRef::WrappedNative => self
                .fixture
                .wrapped_native
                .clone()
                .ok_or_else(|| missing("no wrapped native asset configured".to_string())),
            AssetRef::Protected(index) => self
                .fixture
                .protected
                .get(index)
                .cloned()
                .ok_or_else(|| missing(format!("no protected token #{index}"))),
            AssetRef::VaultShares => Ok(Asset {
                address: self.fixture.sut.vault,
                decimals: self.fixture.sut.want.decimals,
                symbol: format!("yv{}", self.fixture.sut.want.symbol),
            }),
        }
    }

    fn holder(&self, holder: Holder) -> Result<Address, StepError> {
        match holder {
            Holder::Role(role) => Ok(self.actor(role)?.address),
            Holder::Vault => Ok(self.fixture.sut.vault),
            Holder::Strategy => Ok(self.fixture.sut.strategy),
        }
    }

    fn quantity(&self, quantity: &Quantity) -> Result<U256, StepError> {
        let rejected = |what: String| StepError::from(StepFailure::Rejected(what));
        match quantity {
            Quantity::Raw(value) => Ok(*value),
            Quantity::Units(whole) => Ok(self.fixture.sut.want.units(*whole)),
            Quantity::TokenUnits { asset, whole } => Ok(self.asset(*asset)?.units(*whole)),
            Quantity::Funded(depositor) => self
                .fixture
                .funded(*depositor)
                .ok_or_else(|| rejected(format!("depositor {depositor} was not funded"))),
            Quantity::FundedTotal => Ok(self.fixture.funded_total()),
            Quantity::Recorded(key) => self
                .recorded
                .get(key)
                .copied()
                .ok_or_else(|| rejected(format!("`{key}` was never recorded"))),
            Quantity::Bps { of, bps } => Ok(checker::bps_of(self.quantity(of)?, *bps)),
            Quantity::Sum(parts) => parts.iter().try_fold(U256::ZERO, |acc, part| {
                Ok(acc.saturating_add(self.quantity(part)?))
            }),
        }
    }

    /// Submit the operation. The outer error is infrastructure or resolution trouble; the
    /// inner result is the chain's verdict, judged against the step's expectation.
    fn perform(
        &mut self,
        sender: &Identity,
        op: &Operation,
    ) -> Result<Result<Receipt, AdapterError>, StepError> {
        let vault = self.fixture.sut.vault;
        let strategy = self.fixture.sut.strategy;
        let result = match op {
            Operation::Approve {
                asset,
                spender,
                amount,
            } => {
                let asset = self.asset(*asset)?;
                let spender = self.holder(*spender)?;
                let amount = self.quantity(amount)?;
                asset.approve(self.adapter, sender, spender, amount)
            }
            Operation::Deposit { amount } => {
                let amount = self.quantity(amount)?;
                send(self.adapter, sender, vault, &IVault::depositCall { amount })
            }
            Operation::Withdraw(withdraw) => {
                let max_shares = match withdraw {
                    WithdrawAmount::Shares(shares) => self.quantity(shares)?,
                    WithdrawAmount::All => U256::MAX,
                };
                send(
                    self.adapter,
                    sender,
                    vault,
                    &IVault::withdrawCall {
                        maxShares: max_shares,
                    },
                )
            }
            Operation::Harvest => send(self.adapter, sender, strategy, &IStrategy::harvestCall {}),
            Operation::Tend => send(self.adapter, sender, strategy, &IStrategy::tendCall {}),
            Operation::UpdateDebtRatio { bps } => send(
                self.adapter,
                sender,
                vault,
                &IVault::updateStrategyDebtRatioCall {
                    strategy,
                    debtRatio: U256::from(*bps),
                },
            ),
            Operation::Sweep { token } => {
                let token = self.asset(*token)?.address;
                send(self.adapter, sender, strategy, &IStrategy::sweepCall { token })
            }
            Operation::SetEmergencyExit => send(
                self.adapter,
                sender,
                strategy,
                &IStrategy::setEmergencyExitCall {},
            ),
            Operation::Transfer { asset, to, amount } => {
                let asset = self.asset(*asset)?;
                let to = self.holder(*to)?;
                let amount = self.quantity(amount)?;
                asset.transfer(self.adapter, sender, to, amount)
            }
            Operation::WrapNative { amount } => {
                let wrapped = self.asset(AssetRef::WrappedNative)?;
                let value = self.quantity(amount)?;
                self.adapter.transact(
                    sender,
                    TxRequest {
                        to: Some(wrapped.address),
                        data: Bytes::from(IWETH::depositCall {}.abi_encode()),
                        value,
                        label: IWETH::depositCall::SIGNATURE.to_string(),
                    },
                )
            }
        };
        if let Ok(receipt) = &result {
            tracing::debug!(
                "[RUNNER] {} by {} mined in block {} (gas {})",
                op.name(),
                sender.role,
                receipt.block_number,
                receipt.gas_used
            );
        }
        Ok(result)
    }

    fn query(&mut self, query: Query) -> Result<(), StepError> {
        let strategy = self.fixture.sut.strategy;
        let (name, fired) = match query {
            Query::HarvestTrigger { call_cost } => (
                "harvestTrigger",
                read(
                    self.adapter,
                    strategy,
                    &IStrategy::harvestTriggerCall {
                        callCost: call_cost,
                    },
                )?
                ._0,
            ),
            Query::TendTrigger { call_cost } => (
                "tendTrigger",
                read(
                    self.adapter,
                    strategy,
                    &IStrategy::tendTriggerCall {
                        callCost: call_cost,
                    },
                )?
                ._0,
            ),
        };
        tracing::info!("[RUNNER] {} -> {}", name, fired);
        Ok(())
    }

    fn observe(&mut self, probe: &Probe) -> Result<Observed, StepError> {
        let vault = self.fixture.sut.vault;
        let strategy = self.fixture.sut.strategy;
        let observed = match probe {
            Probe::Balance { asset, holder } => {
                let asset = self.asset(*asset)?;
                let owner = self.holder(*holder)?;
                Observed::Amount(asset.balance_of(self.adapter, owner)?)
            }
            Probe::PricePerShare => {
                Observed::Amount(read(self.adapter, vault, &IVault::pricePerShareCall {})?._0)
            }
            Probe::EstimatedTotalAssets => Observed::Amount(
                read(self.adapter, strategy, &IStrategy::estimatedTotalAssetsCall {})?._0,
            ),
            Probe::VaultTotalAssets => {
                Observed::Amount(read(self.adapter, vault, &IVault::totalAssetsCall {})?._0)
            }
            Probe::VaultDebtRatio => {
                Observed::Amount(read(self.adapter, vault, &IVault::debtRatioCall {})?._0)
            }
            Probe::StrategyWant => {
                Observed::Address(read(self.adapter, strategy, &IStrategy::wantCall {})?._0)
            }
        };
        Ok(observed)
    }

    fn observe_amount(&mut self, probe: &Probe) -> Result<U256, StepError> {
        match self.observe(probe)? {
            Observed::Amount(value) => Ok(value),
            Observed::Address(_) => {
                Err(StepFailure::Rejected(format!("{probe} does not yield an amount")).into())
            }
        }
    }

    fn check(&mut self, probe: &Probe, predicate: &Predicate) -> Result<(), StepError> {
        let check = probe.to_string();
        let observed = self.observe(probe)?;
        let amount = |observed: Observed| match observed {
            Observed::Amount(value) => Ok(value),
            Observed::Address(_) => Err(StepError::from(StepFailure::Rejected(format!(
                "{check} yields an address, not an amount"
            )))),
        };
        match predicate {
            Predicate::Eq(expected) => {
                checker::assert_equal(&check, amount(observed)?, self.quantity(expected)?)?
            }
            Predicate::Approx(expected) => checker::assert_approx(
                &check,
                amount(observed)?,
                self.quantity(expected)?,
                self.settings.relative_approx,
            )?,
            Predicate::ApproxWithin { expected, rel } => {
                checker::assert_approx(&check, amount(observed)?, self.quantity(expected)?, *rel)?
            }
            Predicate::AtLeast(bound) => {
                checker::assert_at_least(&check, amount(observed)?, self.quantity(bound)?)?
            }
            Predicate::AtMost(bound) => {
                checker::assert_at_most(&check, amount(observed)?, self.quantity(bound)?)?
            }
            Predicate::Below(bound) => {
                checker::assert_below(&check, amount(observed)?, self.quantity(bound)?)?
            }
            Predicate::IsAsset(asset) | Predicate::NotAsset(asset) => {
                let expected = self.asset(*asset)?.address;
                let Observed::Address(actual) = observed else {
                    return Err(StepFailure::Rejected(format!(
                        "{check} yields an amount, not an address"
                    ))
                    .into());
                };
                let wants_equal = matches!(predicate, Predicate::IsAsset(_));
                if (actual == expected) != wants_equal {
                    let relation = if wants_equal { "==" } else { "!=" };
                    return Err(AssertionFailure::new(
                        check.as_str(),
                        format!("{actual:?}"),
                        format!("{relation} {expected:?}"),
                    )
                    .into());
                }
            }
        }
        Ok(())
    }

    fn check_debt_ratio(&mut self) -> Result<(), StepError> {
        let debt_ratio = read(self.adapter, self.fixture.sut.vault, &IVault::debtRatioCall {})?._0;
        checker::assert_at_most("vault.debtRatio", debt_ratio, U256::from(MAX_BPS))?;
        Ok(())
    }

    /// Snapshot of the strategy's books. The `balanceOf*` views are optional and read as
    /// `None` on strategies that do not expose them.
    pub fn dump_strategy(&mut self) -> Result<StrategyDump, StepError> {
        let fixture = self.fixture;
        let sut = &fixture.sut;
        let estimated_total_assets =
            read(self.adapter, sut.strategy, &IStrategy::estimatedTotalAssetsCall {})?._0;
        let want_balance = sut.want.balance_of(self.adapter, sut.strategy)?;
        let balance_of_want =
            read_optional(self.adapter, sut.strategy, &IStrategyViews::balanceOfWantCall {})?
                .map(|ret| ret._0);
        let balance_of_stake =
            read_optional(self.adapter, sut.strategy, &IStrategyViews::balanceOfStakeCall {})?
                .map(|ret| ret._0);
        let mut protected = Vec::with_capacity(fixture.protected.len());
        for asset in &fixture.protected {
            protected.push((asset.symbol.clone(), asset.balance_of(self.adapter, sut.strategy)?));
        }
        let price_per_share = read(self.adapter, sut.vault, &IVault::pricePerShareCall {})?._0;
        Ok(StrategyDump {
            estimated_total_assets,
            want_balance,
            balance_of_want,
            balance_of_stake,
            protected,
            price_per_share,
        })
    }

    fn inspect(&mut self, label: &str) -> Result<(), StepError> {
        let dump = self.dump_strategy()?;
        let optional =
            |value: Option<U256>| value.map_or_else(|| "n/a".to_string(), |v| v.to_string());
        let protected = dump
            .protected
            .iter()
            .map(|(symbol, balance)| format!("{symbol}={balance}"))
            .collect::<Vec<_>>();
        let clock = self.adapter.clock();
        tracing::info!(
            "[RUNNER] {} | block {} t+{}s | total assets {} | {} balance {} | balanceOfWant {} | balanceOfStake {} | {} | vault pps {}",
            label,
            clock.block_number,
            clock.elapsed_secs(),
            dump.estimated_total_assets,
            self.fixture.sut.want.symbol,
            dump.want_balance,
            optional(dump.balance_of_want),
            optional(dump.balance_of_stake),
            protected.join(" "),
            dump.price_per_share
        );
        Ok(())
    }
}
