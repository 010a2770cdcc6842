//! The reference scenarios every vault/strategy pair is expected to pass.

use super::step::{AssetRef, Holder, Operation, Predicate, Probe, Quantity, Query, WithdrawAmount};
use super::{Scenario, ScenarioBuilder};
use crate::error::SetupError;
use crate::identity::Role;
use alloy::primitives::U256;

const USER: Role = Role::Depositor(0);
const USER_217: Role = Role::Depositor(1);
/// `harvest()` and friends without an explicit sender come from the strategy deployer.
const DEFAULT_SENDER: Role = Role::Strategist;

const SLEEP_ROUNDS: usize = 10;
const SLEEP_ROUND_SECS: u64 = 25_000;
const SLEEP_ROUND_BLOCKS: u64 = 100;

fn want_of(holder: Holder) -> Probe {
    Probe::Balance {
        asset: AssetRef::Want,
        holder,
    }
}

fn weth_of(holder: Holder) -> Probe {
    Probe::Balance {
        asset: AssetRef::WrappedNative,
        holder,
    }
}

fn one_weth() -> Quantity {
    Quantity::TokenUnits {
        asset: AssetRef::WrappedNative,
        whole: 1,
    }
}

pub fn profitable_harvest(profit_unlock_secs: u64) -> Scenario {
    let deposits = Quantity::Sum(vec![Quantity::Funded(0), Quantity::Funded(1)]);
    ScenarioBuilder::new("profitable_harvest")
        .describe("two depositors, repeated harvests, profit unlocks, withdrawals recover deposits")
        .deposit(USER, Quantity::Funded(0))
        .deposit(USER_217, Quantity::Funded(1))
        .check(want_of(Holder::Vault), Predicate::Eq(deposits.clone()))
        .harvest(DEFAULT_SENDER)
        .check(Probe::EstimatedTotalAssets, Predicate::Approx(deposits))
        .record("before_pps", Probe::PricePerShare)
        .sleep_and_harvest(SLEEP_ROUNDS, SLEEP_ROUND_SECS, SLEEP_ROUND_BLOCKS)
        .harvest(DEFAULT_SENDER)
        .sleep(profit_unlock_secs, 1)
        .check(
            Probe::PricePerShare,
            Predicate::AtLeast(Quantity::Recorded("before_pps".into())),
        )
        .transact(
            USER,
            Operation::Withdraw(WithdrawAmount::Shares(Quantity::Funded(0))),
        )
        .transact(
            USER_217,
            Operation::Withdraw(WithdrawAmount::Shares(Quantity::Funded(1))),
        )
        .check(
            want_of(Holder::Role(USER)),
            Predicate::AtLeast(Quantity::Funded(0)),
        )
        .check(
            want_of(Holder::Role(USER_217)),
            Predicate::AtLeast(Quantity::Funded(1)),
        )
        .check(
            Probe::PricePerShare,
            Predicate::AtLeast(Quantity::TokenUnits {
                asset: AssetRef::Want,
                whole: 1,
            }),
        )
        .build()
}

pub fn operation() -> Scenario {
    ScenarioBuilder::new("operation")
        .describe("deposit, harvest, tend, withdraw everything")
        .record("user_balance_before", want_of(Holder::Role(USER)))
        .deposit(USER, Quantity::Funded(0))
        .check(want_of(Holder::Vault), Predicate::Eq(Quantity::Funded(0)))
        .harvest(DEFAULT_SENDER)
        .check(
            Probe::EstimatedTotalAssets,
            Predicate::Approx(Quantity::Funded(0)),
        )
        .transact(DEFAULT_SENDER, Operation::Tend)
        .transact(USER, Operation::Withdraw(WithdrawAmount::All))
        .check(
            want_of(Holder::Role(USER)),
            Predicate::Approx(Quantity::Recorded("user_balance_before".into())),
        )
        .build()
}

pub fn emergency_exit() -> Scenario {
    ScenarioBuilder::new("emergency_exit")
        .describe("emergency exit returns funds to the vault on the next harvest")
        .deposit(USER, Quantity::Funded(0))
        .harvest(DEFAULT_SENDER)
        .check(
            Probe::EstimatedTotalAssets,
            Predicate::Approx(Quantity::Funded(0)),
        )
        .transact(DEFAULT_SENDER, Operation::SetEmergencyExit)
        .harvest(DEFAULT_SENDER)
        .check(
            Probe::EstimatedTotalAssets,
            Predicate::Below(Quantity::Funded(0)),
        )
        .build()
}

pub fn change_debt() -> Scenario {
    let half = || Quantity::half_of(Quantity::Funded(0));
    ScenarioBuilder::new("change_debt")
        .describe("strategy assets follow the vault debt ratio down, up and down again")
        .deposit(USER, Quantity::Funded(0))
        .transact(Role::Governance, Operation::UpdateDebtRatio { bps: 5_000 })
        .harvest(DEFAULT_SENDER)
        .check(Probe::EstimatedTotalAssets, Predicate::Approx(half()))
        .transact(Role::Governance, Operation::UpdateDebtRatio { bps: 10_000 })
        .harvest(DEFAULT_SENDER)
        .check(
            Probe::EstimatedTotalAssets,
            Predicate::Approx(Quantity::Funded(0)),
        )
        .transact(Role::Governance, Operation::UpdateDebtRatio { bps: 5_000 })
        .harvest(DEFAULT_SENDER)
        .check(Probe::EstimatedTotalAssets, Predicate::Approx(half()))
        .build()
}

pub fn sweep() -> Scenario {
    ScenarioBuilder::new("sweep")
        .describe("sweep refuses want, shares and protected tokens but returns stray tokens")
        .transact(USER, Operation::WrapNative { amount: one_weth() })
        .transact(
            USER,
            Operation::Transfer {
                asset: AssetRef::Want,
                to: Holder::Strategy,
                amount: Quantity::Funded(0),
            },
        )
        .check(Probe::StrategyWant, Predicate::IsAsset(AssetRef::Want))
        .check(
            want_of(Holder::Strategy),
            Predicate::AtLeast(Quantity::Raw(U256::from(1))),
        )
        .expect_revert(
            Role::Governance,
            Operation::Sweep {
                token: AssetRef::Want,
            },
            "!want",
        )
        .expect_revert(
            Role::Governance,
            Operation::Sweep {
                token: AssetRef::VaultShares,
            },
            "!shares",
        )
        .expect_revert(
            Role::Governance,
            Operation::Sweep {
                token: AssetRef::Want,
            },
            "!want",
        )
        .expect_revert(
            Role::Governance,
            Operation::Sweep {
                token: AssetRef::Protected(0),
            },
            "!protected",
        )
        .record("gov_weth_before", weth_of(Holder::Role(Role::Governance)))
        .transact(
            USER,
            Operation::Transfer {
                asset: AssetRef::WrappedNative,
                to: Holder::Strategy,
                amount: one_weth(),
            },
        )
        .check(
            Probe::StrategyWant,
            Predicate::NotAsset(AssetRef::WrappedNative),
        )
        .check(
            weth_of(Holder::Role(USER)),
            Predicate::Eq(Quantity::Raw(U256::ZERO)),
        )
        .transact(
            Role::Governance,
            Operation::Sweep {
                token: AssetRef::WrappedNative,
            },
        )
        .check(
            weth_of(Holder::Role(Role::Governance)),
            Predicate::Eq(Quantity::Sum(vec![
                one_weth(),
                Quantity::Recorded("gov_weth_before".into()),
            ])),
        )
        .build()
}

pub fn triggers() -> Scenario {
    ScenarioBuilder::new("triggers")
        .describe("keeper triggers answer without reverting")
        .deposit(USER, Quantity::Funded(0))
        .transact(Role::Governance, Operation::UpdateDebtRatio { bps: 5_000 })
        .harvest(DEFAULT_SENDER)
        .query(Query::HarvestTrigger {
            call_cost: U256::ZERO,
        })
        .query(Query::TendTrigger {
            call_cost: U256::ZERO,
        })
        .build()
}

pub fn reference_catalog(profit_unlock_secs: u64) -> Vec<Scenario> {
    vec![
        profitable_harvest(profit_unlock_secs),
        operation(),
        emergency_exit(),
        change_debt(),
        sweep(),
        triggers(),
    ]
}

/// Keep only the named scenarios, in catalog order. `None` keeps everything.
pub fn select(catalog: Vec<Scenario>, names: Option<&[String]>) -> Result<Vec<Scenario>, SetupError> {
    let Some(names) = names else {
        return Ok(catalog);
    };
    if let Some(unknown) = names
        .iter()
        .find(|name| !catalog.iter().any(|s| &s.name == *name))
    {
        return Err(SetupError::InvalidScenario {
            scenario: unknown.clone(),
            reason: "no scenario with this name in the catalog".to_string(),
        });
    }
    Ok(catalog
        .into_iter()
        .filter(|scenario| names.contains(&scenario.name))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::DEFAULT_PROFIT_UNLOCK_SECS;

    #[test]
    fn test_reference_catalog_validates() {
        for scenario in reference_catalog(DEFAULT_PROFIT_UNLOCK_SECS) {
            scenario
                .validate(DEFAULT_PROFIT_UNLOCK_SECS)
                .unwrap_or_else(|err| panic!("{} invalid: {err}", scenario.name));
        }
    }

    #[test]
    fn test_profitable_harvest_fails_validation_with_short_unlock() {
        let scenario = profitable_harvest(3_600);
        assert!(scenario.validate(DEFAULT_PROFIT_UNLOCK_SECS).is_err());
    }

    #[test]
    fn test_select_filters_and_rejects_unknown_names() {
        let names = vec!["sweep".to_string(), "operation".to_string()];
        let selected = select(reference_catalog(21_600), Some(&names)).expect("select");
        let selected: Vec<_> = selected.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(selected, vec!["operation", "sweep"]);

        let unknown = vec!["nope".to_string()];
        assert!(select(reference_catalog(21_600), Some(&unknown)).is_err());
    }
}
