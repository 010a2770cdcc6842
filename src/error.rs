use alloy::primitives::{Address, Bytes, U256};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SetupError>;

/// Failures surfaced by a [`crate::adapter::ChainAdapter`] backend.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    #[error("execution reverted: {}", .reason.as_deref().unwrap_or("<no reason>"))]
    Revert { reason: Option<String>, data: Bytes },
    #[error("execution halted: {0}")]
    Halt(String),
    #[error("sender {0} is neither a pool account nor impersonated")]
    Unauthorized(Address),
    #[error("impersonation of {0} requires an adapter opened in test mode")]
    ImpersonationDisabled(Address),
    #[error("unknown snapshot id {0}")]
    UnknownSnapshot(u64),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("deploy of `{artifact}` failed: {reason}")]
    Deploy { artifact: String, reason: String },
    #[error("ledger backend error: {0}")]
    Backend(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("{context} timed out after {waited_ms}ms")]
    Timeout { waited_ms: u64, context: String },
}

impl AdapterError {
    pub fn revert(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::Revert {
            data: Bytes::from(crate::contracts::encode_revert(&reason)),
            reason: Some(reason),
        }
    }

    /// Infrastructure failures that say nothing about the contracts under test.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }

    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            Self::Revert { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }
}

impl From<std::convert::Infallible> for AdapterError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

/// Fixture construction failed; the scenario cannot run any step.
#[derive(Debug, Clone, Error)]
pub enum SetupError {
    #[error("no reserve configured for asset {0}")]
    MissingReserve(Address),
    #[error(
        "reserve {reserve} holds {available} of {asset}, {required} required"
    )]
    InsufficientReserve {
        asset: Address,
        reserve: Address,
        available: U256,
        required: U256,
    },
    #[error("identity pool has {pool_len} accounts, role {role} needs slot {slot}")]
    PoolExhausted {
        role: String,
        slot: usize,
        pool_len: usize,
    },
    #[error("role {0} is not allocated from the identity pool")]
    UnallocatableRole(String),
    #[error("artifact error: {0}")]
    Artifact(String),
    #[error("invalid scenario `{scenario}`: {reason}")]
    InvalidScenario { scenario: String, reason: String },
    #[error("{stage}: {source}")]
    Adapter {
        stage: String,
        #[source]
        source: AdapterError,
    },
}

impl SetupError {
    pub fn adapter(stage: impl Into<String>, source: AdapterError) -> Self {
        Self::Adapter {
            stage: stage.into(),
            source,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Adapter { source, .. } if source.is_transport())
    }
}

/// A call succeeded but produced a value outside the asserted bound.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{check}: actual {actual}, expected {expected}")]
pub struct AssertionFailure {
    pub check: String,
    pub actual: String,
    pub expected: String,
}

impl AssertionFailure {
    pub fn new(
        check: impl Into<String>,
        actual: impl std::fmt::Display,
        expected: impl std::fmt::Display,
    ) -> Self {
        Self {
            check: check.into(),
            actual: actual.to_string(),
            expected: expected.to_string(),
        }
    }
}

/// Why a single scenario step failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepFailure {
    #[error("unexpected revert: {}", .reason.as_deref().unwrap_or("<no reason>"))]
    UnexpectedRevert { reason: Option<String> },
    #[error("expected revert `{expected}`, got `{}`", .actual.as_deref().unwrap_or("<no reason>"))]
    RevertMismatch {
        expected: String,
        actual: Option<String>,
    },
    #[error("expected revert `{expected}` but the call succeeded")]
    MissingRevert { expected: String },
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),
    #[error("adapter rejected step: {0}")]
    Rejected(String),
}

/// Outcome of evaluating one step: a logic failure, or infrastructure that gave out.
#[derive(Debug, Clone, Error)]
pub enum StepError {
    #[error(transparent)]
    Failure(#[from] StepFailure),
    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<AssertionFailure> for StepError {
    fn from(value: AssertionFailure) -> Self {
        Self::Failure(StepFailure::Assertion(value))
    }
}

impl From<AdapterError> for StepError {
    fn from(value: AdapterError) -> Self {
        match value {
            err if err.is_transport() => Self::Transport(err.to_string()),
            AdapterError::Revert { reason, .. } => {
                Self::Failure(StepFailure::UnexpectedRevert { reason })
            }
            AdapterError::Halt(reason) => Self::Failure(StepFailure::UnexpectedRevert {
                reason: Some(format!("halt: {reason}")),
            }),
            other => Self::Failure(StepFailure::Rejected(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
