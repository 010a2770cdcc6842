use crate::identity::Role;
use alloy::primitives::U256;
use std::fmt;

/// One ordered action in a scenario.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Transact {
        actor: Role,
        op: Operation,
        expect: Expect,
    },
    /// Read-only keeper query; must not revert and must decode as a bool.
    Query(Query),
    AdvanceTime(u64),
    MineBlocks(u64),
    Record {
        key: String,
        probe: Probe,
    },
    Check {
        probe: Probe,
        predicate: Predicate,
    },
    /// Dump strategy and vault state to the log.
    Inspect {
        label: String,
    },
}

impl Step {
    pub fn is_mutating(&self) -> bool {
        matches!(self, Step::Transact { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Approve {
        asset: AssetRef,
        spender: Holder,
        amount: Quantity,
    },
    Deposit {
        amount: Quantity,
    },
    Withdraw(WithdrawAmount),
    Harvest,
    Tend,
    UpdateDebtRatio {
        bps: u16,
    },
    Sweep {
        token: AssetRef,
    },
    SetEmergencyExit,
    Transfer {
        asset: AssetRef,
        to: Holder,
        amount: Quantity,
    },
    WrapNative {
        amount: Quantity,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Approve { .. } => "approve",
            Operation::Deposit { .. } => "deposit",
            Operation::Withdraw(_) => "withdraw",
            Operation::Harvest => "harvest",
            Operation::Tend => "tend",
            Operation::UpdateDebtRatio { .. } => "updateStrategyDebtRatio",
            Operation::Sweep { .. } => "sweep",
            Operation::SetEmergencyExit => "setEmergencyExit",
            Operation::Transfer { .. } => "transfer",
            Operation::WrapNative { .. } => "wrapNative",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WithdrawAmount {
    Shares(Quantity),
    /// Redeem every share the actor holds.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    HarvestTrigger { call_cost: U256 },
    TendTrigger { call_cost: U256 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expect {
    Success,
    /// Revert whose reason contains this substring.
    Revert(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetRef {
    Want,
    WrappedNative,
    /// Index into the configured protected tokens.
    Protected(usize),
    /// The vault's own share token.
    VaultShares,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Holder {
    Role(Role),
    Vault,
    Strategy,
}

/// Amount expression resolved against the fixture and the recorded values at run time.
#[derive(Debug, Clone, PartialEq)]
pub enum Quantity {
    Raw(U256),
    /// Whole units of the want token.
    Units(u64),
    TokenUnits { asset: AssetRef, whole: u64 },
    /// Want amount funded to `Depositor(n)`.
    Funded(u8),
    FundedTotal,
    Recorded(String),
    Bps { of: Box<Quantity>, bps: u16 },
    Sum(Vec<Quantity>),
}

impl Quantity {
    pub fn half_of(of: Quantity) -> Self {
        Quantity::Bps {
            of: Box::new(of),
            bps: 5_000,
        }
    }

    /// Recorded keys this expression reads.
    pub fn recorded_keys(&self) -> Vec<&str> {
        match self {
            Quantity::Recorded(key) => vec![key.as_str()],
            Quantity::Bps { of, .. } => of.recorded_keys(),
            Quantity::Sum(parts) => parts.iter().flat_map(|q| q.recorded_keys()).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Balance { asset: AssetRef, holder: Holder },
    PricePerShare,
    EstimatedTotalAssets,
    VaultTotalAssets,
    VaultDebtRatio,
    /// Address the strategy reports from `want()`.
    StrategyWant,
}

impl Probe {
    pub fn yields_address(&self) -> bool {
        matches!(self, Probe::StrategyWant)
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Probe::Balance { asset, holder } => write!(f, "balanceOf({asset:?}, {holder:?})"),
            Probe::PricePerShare => f.write_str("vault.pricePerShare"),
            Probe::EstimatedTotalAssets => f.write_str("strategy.estimatedTotalAssets"),
            Probe::VaultTotalAssets => f.write_str("vault.totalAssets"),
            Probe::VaultDebtRatio => f.write_str("vault.debtRatio"),
            Probe::StrategyWant => f.write_str("strategy.want"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Quantity),
    /// Relative tolerance taken from the session settings.
    Approx(Quantity),
    ApproxWithin { expected: Quantity, rel: f64 },
    AtLeast(Quantity),
    AtMost(Quantity),
    Below(Quantity),
    IsAsset(AssetRef),
    NotAsset(AssetRef),
}

impl Predicate {
    pub fn compares_address(&self) -> bool {
        matches!(self, Predicate::IsAsset(_) | Predicate::NotAsset(_))
    }

    pub fn quantity(&self) -> Option<&Quantity> {
        match self {
            Predicate::Eq(q)
            | Predicate::Approx(q)
            | Predicate::AtLeast(q)
            | Predicate::AtMost(q)
            | Predicate::Below(q) => Some(q),
            Predicate::ApproxWithin { expected, .. } => Some(expected),
            Predicate::IsAsset(_) | Predicate::NotAsset(_) => None,
        }
    }
}
