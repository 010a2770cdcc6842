use crate::error::SetupError;
use alloy::primitives::{keccak256, Address};
use std::collections::BTreeMap;
use std::fmt;

/// Pool slots `1..=GOVERNANCE_SLOT` are reserved for the named roles.
const GOVERNANCE_SLOT: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    Governance,
    Rewards,
    Guardian,
    Management,
    Strategist,
    Keeper,
    Depositor(u8),
    /// Impersonated asset holder used to fund depositors.
    Reserve,
    /// Impersonated address with no harness role.
    External,
}

impl Role {
    /// Deterministic role -> pool slot mapping so repeated runs line up account-for-account.
    pub fn pool_slot(self, pool_len: usize) -> Result<usize, SetupError> {
        let slot = match self {
            Role::Depositor(0) => 0,
            Role::Rewards => 1,
            Role::Guardian => 2,
            Role::Management => 3,
            Role::Strategist => 4,
            Role::Keeper => 5,
            Role::Governance => GOVERNANCE_SLOT,
            Role::Depositor(n) => {
                let slot = pool_len.checked_sub(usize::from(n)).unwrap_or(0);
                if slot <= GOVERNANCE_SLOT {
                    return Err(SetupError::PoolExhausted {
                        role: self.to_string(),
                        slot: GOVERNANCE_SLOT + usize::from(n),
                        pool_len,
                    });
                }
                slot
            }
            Role::Reserve | Role::External => {
                return Err(SetupError::UnallocatableRole(self.to_string()))
            }
        };
        if slot >= pool_len {
            return Err(SetupError::PoolExhausted {
                role: self.to_string(),
                slot,
                pool_len,
            });
        }
        Ok(slot)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Governance => f.write_str("gov"),
            Role::Rewards => f.write_str("rewards"),
            Role::Guardian => f.write_str("guardian"),
            Role::Management => f.write_str("management"),
            Role::Strategist => f.write_str("strategist"),
            Role::Keeper => f.write_str("keeper"),
            Role::Depositor(n) => write!(f, "depositor-{n}"),
            Role::Reserve => f.write_str("reserve"),
            Role::External => f.write_str("external"),
        }
    }
}

/// How an adapter is able to sign for an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    Pool(usize),
    Impersonated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub address: Address,
    pub role: Role,
    pub authority: Authority,
}

impl Identity {
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

/// Session-wide pool of test identities. Each role maps to exactly one identity for the
/// lifetime of the session.
#[derive(Debug, Clone)]
pub struct IdentityRegistry {
    pool: Vec<Address>,
    allocated: BTreeMap<Role, Identity>,
}

impl IdentityRegistry {
    pub fn new(pool: Vec<Address>) -> Self {
        Self {
            pool,
            allocated: BTreeMap::new(),
        }
    }

    /// Pin governance to an impersonated address instead of pool slot 6.
    pub fn with_governance(mut self, governance: Identity) -> Self {
        self.allocated
            .insert(Role::Governance, governance.with_role(Role::Governance));
        self
    }

    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    pub fn allocate(&mut self, role: Role) -> Result<Identity, SetupError> {
        if let Some(identity) = self.allocated.get(&role) {
            return Ok(*identity);
        }
        let slot = role.pool_slot(self.pool.len())?;
        let identity = Identity {
            address: self.pool[slot],
            role,
            authority: Authority::Pool(slot),
        };
        self.allocated.insert(role, identity);
        tracing::debug!("[IDENTITY] {} -> {:?} (slot {})", role, identity.address, slot);
        Ok(identity)
    }

    pub fn allocated(&self) -> impl Iterator<Item = &Identity> {
        self.allocated.values()
    }
}

/// Deterministic local pool for in-process backends that have no node-provided accounts.
pub fn derive_pool_accounts(count: usize) -> Vec<Address> {
    (0..count)
        .map(|index| {
            let hash = keccak256(format!("vault-harness/pool/{index}").as_bytes());
            Address::from_slice(&hash[12..])
        })
        .collect()
}
