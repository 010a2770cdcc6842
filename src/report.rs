//! Per-scenario and suite outcomes.

use crate::error::{SetupError, StepError};
use crate::fixture::FixtureNode;
use crate::scenario::StepFailed;
use alloy::primitives::U256;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    /// The fixture could not be built; no step ran.
    SetupFailed { reason: String },
    Failed {
        step: usize,
        operation: String,
        failure: String,
    },
    /// The ledger stopped answering. Says nothing about the contracts under test.
    TransportFailed { reason: String },
}

impl Outcome {
    pub fn from_setup(err: &SetupError) -> Self {
        if err.is_transport() {
            Self::TransportFailed {
                reason: err.to_string(),
            }
        } else {
            Self::SetupFailed {
                reason: err.to_string(),
            }
        }
    }

    pub fn from_step(failed: &StepFailed) -> Self {
        match &failed.error {
            StepError::Transport(reason) => Self::TransportFailed {
                reason: format!("step {}: {reason}", failed.index),
            },
            StepError::Failure(failure) => Self::Failed {
                step: failed.index,
                operation: failed.step.clone(),
                failure: failure.to_string(),
            },
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Passed)
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Passed => "PASS",
            Self::SetupFailed { .. } => "SETUP",
            Self::Failed { .. } => "FAIL",
            Self::TransportFailed { .. } => "TRANSPORT",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub outcome: Outcome,
    pub steps_run: usize,
    pub steps_total: usize,
    pub fixture_trace: Vec<FixtureNode>,
    /// Recorded probe values, rendered as decimal strings.
    pub recorded: BTreeMap<String, String>,
    pub simulated_secs: u64,
    pub blocks_mined: u64,
    pub wall_ms: u128,
}

impl ScenarioReport {
    pub fn new(scenario: impl Into<String>, steps_total: usize, outcome: Outcome) -> Self {
        Self {
            scenario: scenario.into(),
            outcome,
            steps_run: 0,
            steps_total,
            fixture_trace: Vec::new(),
            recorded: BTreeMap::new(),
            simulated_secs: 0,
            blocks_mined: 0,
            wall_ms: 0,
        }
    }

    pub fn with_recorded(mut self, recorded: &BTreeMap<String, U256>) -> Self {
        self.recorded = recorded
            .iter()
            .map(|(key, value)| (key.clone(), value.to_string()))
            .collect();
        self
    }

    pub fn summary_line(&self) -> String {
        let detail = match &self.outcome {
            Outcome::Passed => String::new(),
            Outcome::SetupFailed { reason } | Outcome::TransportFailed { reason } => {
                format!(" - {reason}")
            }
            Outcome::Failed { step, failure, .. } => format!(" - step {step}: {failure}"),
        };
        format!(
            "[{}] {} ({}/{} steps){}",
            self.outcome.label(),
            self.scenario,
            self.steps_run,
            self.steps_total,
            detail
        )
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SuiteReport {
    pub backend: String,
    pub chain_id: Option<u64>,
    pub fork_block: Option<u64>,
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            ..Self::default()
        }
    }

    pub fn push(&mut self, report: ScenarioReport) {
        self.scenarios.push(report);
    }

    pub fn passed(&self) -> bool {
        self.scenarios.iter().all(|r| r.outcome.is_pass())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ScenarioReport> {
        self.scenarios.iter().filter(|r| !r.outcome.is_pass())
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)
            .map_err(|err| anyhow::anyhow!("failed to write report {}: {err}", path.display()))
    }
}
