use crate::adapter::{ChainAdapter, Receipt};
use crate::contracts::{read, send, IERC20};
use crate::error::AdapterError;
use crate::identity::Identity;
use alloy::primitives::{Address, U256};

/// ERC-20 handle with its metadata resolved once at attach time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub address: Address,
    pub decimals: u8,
    pub symbol: String,
}

impl Asset {
    pub fn attach<A: ChainAdapter + ?Sized>(
        adapter: &mut A,
        address: Address,
    ) -> Result<Self, AdapterError> {
        let decimals = read(adapter, address, &IERC20::decimalsCall {})?._0;
        // Some tokens (MKR-style) return bytes32 symbols; fall back to the address.
        let symbol = read(adapter, address, &IERC20::symbolCall {})
            .map(|ret| ret._0)
            .unwrap_or_else(|_| format!("{address:?}"));
        Ok(Self {
            address,
            decimals,
            symbol,
        })
    }

    /// `whole * 10^decimals`.
    pub fn units(&self, whole: u64) -> U256 {
        U256::from(whole) * U256::from(10u64).pow(U256::from(self.decimals))
    }

    pub fn balance_of<A: ChainAdapter + ?Sized>(
        &self,
        adapter: &mut A,
        owner: Address,
    ) -> Result<U256, AdapterError> {
        Ok(read(adapter, self.address, &IERC20::balanceOfCall { owner })?._0)
    }

    pub fn transfer<A: ChainAdapter + ?Sized>(
        &self,
        adapter: &mut A,
        from: &Identity,
        to: Address,
        amount: U256,
    ) -> Result<Receipt, AdapterError> {
        send(adapter, from, self.address, &IERC20::transferCall { to, amount })
    }

    pub fn approve<A: ChainAdapter + ?Sized>(
        &self,
        adapter: &mut A,
        owner: &Identity,
        spender: Address,
        amount: U256,
    ) -> Result<Receipt, AdapterError> {
        send(
            adapter,
            owner,
            self.address,
            &IERC20::approveCall { spender, amount },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units_scale_by_decimals() {
        let asset = Asset {
            address: Address::ZERO,
            decimals: 6,
            symbol: "USDC".to_string(),
        };
        assert_eq!(asset.units(1_000), U256::from(1_000_000_000u64));
        let wad = Asset {
            decimals: 18,
            ..asset
        };
        assert_eq!(wad.units(1), crate::utils::constants::WAD_U256);
    }
}
