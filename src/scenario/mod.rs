//! Scenarios: ordered steps driven against a built fixture.

pub mod catalog;
pub mod runner;
pub mod step;

pub use runner::{RunSettings, ScenarioRunner, StepFailed, StrategyDump};
pub use step::{
    AssetRef, Expect, Holder, Operation, Predicate, Probe, Quantity, Query, Step, WithdrawAmount,
};

use crate::error::SetupError;
use crate::identity::Role;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub description: String,
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Reject step sequences that could never mean what they assert.
    ///
    /// Every recorded key must be written before it is read, and a price-per-share check
    /// against a recorded baseline taken before a harvest must let locked profit unlock
    /// first: at least `lock_window_secs` of advanced time and one mined block after the
    /// last harvest.
    pub fn validate(&self, lock_window_secs: u64) -> Result<(), SetupError> {
        let invalid = |index: usize, reason: String| SetupError::InvalidScenario {
            scenario: self.name.clone(),
            reason: format!("step {index}: {reason}"),
        };

        // key -> (probe, step index)
        let mut recorded: HashMap<&str, (Probe, usize)> = HashMap::new();
        let mut last_harvest: Option<usize> = None;
        let mut advanced_since_harvest = 0u64;
        let mut mined_since_harvest = 0u64;

        for (index, step) in self.steps.iter().enumerate() {
            for key in step_reads(step) {
                if !recorded.contains_key(key) {
                    return Err(invalid(index, format!("reads `{key}` before it is recorded")));
                }
            }
            match step {
                Step::Transact {
                    op: Operation::Harvest,
                    ..
                } => {
                    last_harvest = Some(index);
                    advanced_since_harvest = 0;
                    mined_since_harvest = 0;
                }
                Step::AdvanceTime(seconds) => {
                    advanced_since_harvest = advanced_since_harvest.saturating_add(*seconds)
                }
                Step::MineBlocks(blocks) => {
                    mined_since_harvest = mined_since_harvest.saturating_add(*blocks)
                }
                Step::Record { key, probe } => {
                    recorded.insert(key.as_str(), (*probe, index));
                }
                Step::Check { probe, predicate } => {
                    if probe.yields_address() != predicate.compares_address() {
                        return Err(invalid(
                            index,
                            format!("predicate {predicate:?} cannot be applied to {probe}"),
                        ));
                    }
                    if *probe != Probe::PricePerShare {
                        continue;
                    }
                    let baselines = predicate
                        .quantity()
                        .map(Quantity::recorded_keys)
                        .unwrap_or_default();
                    for key in baselines {
                        let Some((Probe::PricePerShare, recorded_at)) = recorded.get(key).copied()
                        else {
                            continue;
                        };
                        let harvested_since = last_harvest.is_some_and(|h| h > recorded_at);
                        if harvested_since
                            && (advanced_since_harvest < lock_window_secs
                                || mined_since_harvest == 0)
                        {
                            return Err(invalid(
                                index,
                                format!(
                                    "price-per-share compared to `{key}` after a harvest needs \
                                     >= {lock_window_secs}s advanced and a mined block \
                                     (have {advanced_since_harvest}s, {mined_since_harvest} blocks)"
                                ),
                            ));
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn step_reads(step: &Step) -> Vec<&str> {
    match step {
        Step::Transact { op, .. } => match op {
            Operation::Approve { amount, .. }
            | Operation::Deposit { amount }
            | Operation::Transfer { amount, .. }
            | Operation::WrapNative { amount }
            | Operation::Withdraw(WithdrawAmount::Shares(amount)) => amount.recorded_keys(),
            _ => Vec::new(),
        },
        Step::Check { predicate, .. } => predicate
            .quantity()
            .map(Quantity::recorded_keys)
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Fluent construction of scenarios.
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    scenario: Scenario,
}

impl ScenarioBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            scenario: Scenario {
                name: name.into(),
                description: String::new(),
                steps: Vec::new(),
            },
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.scenario.description = description.into();
        self
    }

    pub fn step(mut self, step: Step) -> Self {
        self.scenario.steps.push(step);
        self
    }

    pub fn transact(self, actor: Role, op: Operation) -> Self {
        self.step(Step::Transact {
            actor,
            op,
            expect: Expect::Success,
        })
    }

    pub fn expect_revert(self, actor: Role, op: Operation, reason: impl Into<String>) -> Self {
        self.step(Step::Transact {
            actor,
            op,
            expect: Expect::Revert(reason.into()),
        })
    }

    /// Approve the vault for `amount` of want and deposit it.
    pub fn deposit(self, actor: Role, amount: Quantity) -> Self {
        self.transact(
            actor,
            Operation::Approve {
                asset: AssetRef::Want,
                spender: Holder::Vault,
                amount: amount.clone(),
            },
        )
        .transact(actor, Operation::Deposit { amount })
    }

    pub fn harvest(self, actor: Role) -> Self {
        self.transact(actor, Operation::Harvest)
    }

    pub fn check(self, probe: Probe, predicate: Predicate) -> Self {
        self.step(Step::Check { probe, predicate })
    }

    pub fn record(self, key: impl Into<String>, probe: Probe) -> Self {
        self.step(Step::Record {
            key: key.into(),
            probe,
        })
    }

    pub fn inspect(self, label: impl Into<String>) -> Self {
        self.step(Step::Inspect {
            label: label.into(),
        })
    }

    pub fn query(self, query: Query) -> Self {
        self.step(Step::Query(query))
    }

    pub fn sleep(self, seconds: u64, blocks: u64) -> Self {
        self.step(Step::AdvanceTime(seconds))
            .step(Step::MineBlocks(blocks))
    }

    /// `times` rounds of: inspect, sleep, harvest from governance, inspect.
    pub fn sleep_and_harvest(self, times: usize, seconds: u64, blocks: u64) -> Self {
        (0..times).fold(self, |builder, round| {
            builder
                .inspect(format!("Before harvest {round}"))
                .sleep(seconds, blocks)
                .harvest(Role::Governance)
                .inspect(format!("After harvest {round}"))
        })
    }

    pub fn build(self) -> Scenario {
        self.scenario
    }
}
