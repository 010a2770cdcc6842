//! Explicit session context: one adapter, one identity registry, one reserve book.
//!
//! Every scenario runs on a fresh fixture inside a snapshot that is reverted afterwards, so
//! scenarios sharing a session never observe each other's state.

use crate::adapter::ChainAdapter;
use crate::asset::Asset;
use crate::error::SetupError;
use crate::fixture::{FixtureGraph, FixtureInputs};
use crate::funding::{preflight, ReserveBook};
use crate::identity::{IdentityRegistry, Role};
use crate::report::{Outcome, ScenarioReport, SuiteReport};
use crate::scenario::{RunSettings, Scenario, ScenarioRunner};
use alloy::primitives::{Address, U256};
use std::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    pub run: RunSettings,
    /// Impersonate this address as governance instead of using pool slot 6.
    pub governance: Option<Address>,
}

pub struct Session<A: ChainAdapter> {
    adapter: A,
    registry: IdentityRegistry,
    reserves: ReserveBook,
    inputs: FixtureInputs,
    settings: SessionSettings,
}

impl<A: ChainAdapter> Session<A> {
    /// Allocate governance and check the want reserve can cover every depositor before any
    /// scenario runs.
    pub fn open(
        mut adapter: A,
        reserves: ReserveBook,
        inputs: FixtureInputs,
        settings: SessionSettings,
    ) -> Result<Self, SetupError> {
        let mut registry = IdentityRegistry::new(adapter.accounts().to_vec());
        if let Some(governance) = settings.governance {
            let identity = adapter
                .impersonate(governance)
                .map_err(|err| SetupError::adapter("impersonate governance", err))?;
            registry = registry.with_governance(identity.with_role(Role::Governance));
            tracing::info!("[SESSION] Governance impersonated at {:?}", governance);
        }

        let want = Asset::attach(&mut adapter, inputs.want)
            .map_err(|err| SetupError::adapter("attach want", err))?;
        let required = inputs
            .config
            .depositor_units
            .iter()
            .fold(U256::ZERO, |acc, whole| acc.saturating_add(want.units(*whole)));
        preflight(&mut adapter, &reserves, &[(want.clone(), required)])?;

        let clock = adapter.clock();
        tracing::info!(
            "[SESSION] Opened at block {} (ts {}) for want {} with {} pool accounts",
            clock.block_number,
            clock.timestamp,
            want.symbol,
            registry.pool_len()
        );
        Ok(Self {
            adapter,
            registry,
            reserves,
            inputs,
            settings,
        })
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn inputs(&self) -> &FixtureInputs {
        &self.inputs
    }

    pub fn into_adapter(self) -> A {
        self.adapter
    }

    pub fn run(&mut self, scenario: &Scenario) -> ScenarioReport {
        let started = Instant::now();
        let steps_total = scenario.steps.len();
        if let Err(err) = scenario.validate(self.inputs.config.profit_unlock_secs) {
            tracing::warn!("[SESSION] {} rejected: {}", scenario.name, err);
            return ScenarioReport::new(&scenario.name, steps_total, Outcome::from_setup(&err));
        }
        let snapshot = match self.adapter.snapshot() {
            Ok(id) => id,
            Err(err) => {
                let err = SetupError::adapter("snapshot", err);
                return ScenarioReport::new(&scenario.name, steps_total, Outcome::from_setup(&err));
            }
        };
        let clock_before = self.adapter.clock();
        tracing::info!("[SESSION] Running {} ({} steps)", scenario.name, steps_total);

        let mut report = self.run_in_snapshot(scenario);

        let clock_after = self.adapter.clock();
        report.simulated_secs = clock_after.timestamp.saturating_sub(clock_before.timestamp);
        report.blocks_mined = clock_after
            .block_number
            .saturating_sub(clock_before.block_number);

        if let Err(err) = self.adapter.revert_to(snapshot) {
            tracing::error!(
                "[SESSION] Failed to restore snapshot after {}: {}",
                scenario.name,
                err
            );
            if report.outcome.is_pass() {
                report.outcome =
                    Outcome::from_setup(&SetupError::adapter("revert snapshot", err));
            }
        }
        report.wall_ms = started.elapsed().as_millis();
        tracing::info!("[SESSION] {}", report.summary_line());
        report
    }

    fn run_in_snapshot(&mut self, scenario: &Scenario) -> ScenarioReport {
        let steps_total = scenario.steps.len();
        let graph = FixtureGraph::new(
            &mut self.adapter,
            &mut self.registry,
            &self.reserves,
            &self.inputs,
        );
        let fixture = match graph.build() {
            Ok(fixture) => fixture,
            Err(err) => {
                tracing::warn!("[SESSION] {} setup failed: {}", scenario.name, err);
                return ScenarioReport::new(&scenario.name, steps_total, Outcome::from_setup(&err));
            }
        };

        let mut runner = ScenarioRunner::new(&mut self.adapter, &fixture, self.settings.run);
        let outcome = match runner.run(scenario) {
            Ok(()) => Outcome::Passed,
            Err(failed) => Outcome::from_step(&failed),
        };
        let mut report =
            ScenarioReport::new(&scenario.name, steps_total, outcome).with_recorded(runner.recorded());
        report.steps_run = runner.steps_run();
        report.fixture_trace = fixture.trace;
        report
    }

    /// Run scenarios one after another; a failure never stops its siblings.
    pub fn run_suite(&mut self, scenarios: &[Scenario], backend: &str) -> SuiteReport {
        let mut suite = SuiteReport::new(backend);
        for scenario in scenarios {
            suite.push(self.run(scenario));
        }
        suite
    }
}

/// Run each scenario on its own session, one thread per scenario. Sessions are built inside
/// their thread by `open` and never shared. Reports come back in input order.
pub fn run_isolated<A, F>(scenarios: &[Scenario], backend: &str, open: F) -> SuiteReport
where
    A: ChainAdapter,
    F: Fn() -> Result<Session<A>, SetupError> + Sync,
{
    let open = &open;
    let reports: Vec<ScenarioReport> = std::thread::scope(|scope| {
        let handles: Vec<_> = scenarios
            .iter()
            .map(|scenario| {
                scope.spawn(move || match open() {
                    Ok(mut session) => session.run(scenario),
                    Err(err) => {
                        tracing::warn!(
                            "[SESSION] Could not open a session for {}: {}",
                            scenario.name,
                            err
                        );
                        ScenarioReport::new(
                            &scenario.name,
                            scenario.steps.len(),
                            Outcome::from_setup(&err),
                        )
                    }
                })
            })
            .collect();
        handles
            .into_iter()
            .zip(scenarios)
            .map(|(handle, scenario)| {
                handle.join().unwrap_or_else(|_| {
                    tracing::error!("[SESSION] Worker for {} panicked", scenario.name);
                    ScenarioReport::new(
                        &scenario.name,
                        scenario.steps.len(),
                        Outcome::SetupFailed {
                            reason: "worker thread panicked".to_string(),
                        },
                    )
                })
            })
            .collect()
    });

    let mut suite = SuiteReport::new(backend);
    for report in reports {
        suite.push(report);
    }
    suite
}
