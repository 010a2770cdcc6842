//! Reserve-backed funding of test identities.
//!
//! Assets are never minted: each asset has a configured reserve account on the forked chain
//! which is impersonated and made to transfer to the recipient.

use crate::adapter::{ChainAdapter, Receipt, TxRequest};
use crate::asset::Asset;
use crate::error::SetupError;
use crate::identity::{Identity, Role};
use alloy::primitives::{Address, U256};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReserveBook {
    reserves: BTreeMap<Address, Address>,
}

impl ReserveBook {
    pub fn new(entries: impl IntoIterator<Item = (Address, Address)>) -> Self {
        Self {
            reserves: entries.into_iter().collect(),
        }
    }

    pub fn reserve_for(&self, asset: Address) -> Option<Address> {
        self.reserves.get(&asset).copied()
    }

    pub fn insert(&mut self, asset: Address, reserve: Address) {
        self.reserves.insert(asset, reserve);
    }
}

fn reserve_balance<A: ChainAdapter + ?Sized>(
    adapter: &mut A,
    asset: &Asset,
    reserve: Address,
) -> Result<U256, SetupError> {
    asset
        .balance_of(adapter, reserve)
        .map_err(|err| SetupError::adapter(format!("read reserve balance of {}", asset.symbol), err))
}

/// Move `amount` of `asset` from its reserve to `recipient`.
pub fn fund<A: ChainAdapter + ?Sized>(
    adapter: &mut A,
    book: &ReserveBook,
    recipient: &Identity,
    asset: &Asset,
    amount: U256,
) -> Result<Receipt, SetupError> {
    let reserve = book
        .reserve_for(asset.address)
        .ok_or(SetupError::MissingReserve(asset.address))?;
    let holder = adapter
        .impersonate(reserve)
        .map_err(|err| SetupError::adapter("impersonate reserve", err))?
        .with_role(Role::Reserve);

    let available = reserve_balance(adapter, asset, reserve)?;
    if available < amount {
        return Err(SetupError::InsufficientReserve {
            asset: asset.address,
            reserve,
            available,
            required: amount,
        });
    }
    let receipt = asset
        .transfer(adapter, &holder, recipient.address, amount)
        .map_err(|err| SetupError::adapter(format!("fund {} with {}", recipient.role, asset.symbol), err))?;
    tracing::info!(
        "[FUND] {} <- {} {} from reserve {:?}",
        recipient.role,
        amount,
        asset.symbol,
        reserve
    );
    Ok(receipt)
}

/// Plain value transfer between identities.
pub fn fund_native<A: ChainAdapter + ?Sized>(
    adapter: &mut A,
    from: &Identity,
    to: Address,
    amount: U256,
) -> Result<Receipt, SetupError> {
    adapter
        .transact(from, TxRequest::value_transfer(to, amount))
        .map_err(|err| SetupError::adapter(format!("native transfer from {}", from.role), err))
}

/// Fail fast before any scenario runs: every reserve must already cover the largest amount a
/// single scenario will draw from it.
pub fn preflight<A: ChainAdapter + ?Sized>(
    adapter: &mut A,
    book: &ReserveBook,
    requirements: &[(Asset, U256)],
) -> Result<(), SetupError> {
    for (asset, required) in requirements {
        let reserve = book
            .reserve_for(asset.address)
            .ok_or(SetupError::MissingReserve(asset.address))?;
        let available = reserve_balance(adapter, asset, reserve)?;
        if available < *required {
            return Err(SetupError::InsufficientReserve {
                asset: asset.address,
                reserve,
                available,
                required: *required,
            });
        }
        tracing::info!(
            "[FUND] Preflight ok: reserve {:?} holds {} {} (needs {})",
            reserve,
            available,
            asset.symbol,
            required
        );
    }
    Ok(())
}
