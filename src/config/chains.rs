use alloy::primitives::{address, Address};

/// A token and an account known to hold a large balance of it on the forked chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveAsset {
    pub token: Address,
    pub reserve: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub wrapped_native: Option<Address>,
    /// Tokens a strategy must refuse to sweep.
    pub protected_tokens: Vec<Address>,
    pub default_want: Option<ReserveAsset>,
    pub block_time_secs: u64,
}

impl ChainConfig {
    pub fn get(chain_id: u64) -> Self {
        match chain_id {
            1 => Self::mainnet(),
            10 => Self::optimism(),
            137 => Self::polygon(),
            8453 => Self::base(),
            42161 => Self::arbitrum(),
            other => Self::local(other),
        }
    }

    pub fn mainnet() -> Self {
        Self {
            chain_id: 1,
            name: "Ethereum Mainnet".to_string(),
            wrapped_native: Some(address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2")),
            protected_tokens: vec![address!("6B175474E89094C44Da98b954EedeAC495271d0F")],
            default_want: Some(ReserveAsset {
                token: address!("8888801af4d980682e47f1a9036e589479e835c5"),
                reserve: address!("98df8d9e56b51e4ea8aa9b57f8a5df7a044234e1"),
            }),
            block_time_secs: 12,
        }
    }

    pub fn optimism() -> Self {
        Self {
            chain_id: 10,
            name: "Optimism".to_string(),
            wrapped_native: Some(address!("4200000000000000000000000000000000000006")),
            protected_tokens: vec![address!("DA10009cBd5D07dd0CeCc66161FC93D7c9000da1")],
            default_want: None,
            block_time_secs: 2,
        }
    }

    pub fn polygon() -> Self {
        Self {
            chain_id: 137,
            name: "Polygon".to_string(),
            wrapped_native: Some(address!("0d500B1d8E8eF31E21C99d1Db9A6444d3ADf1270")),
            protected_tokens: vec![address!("8f3Cf7ad23Cd3CaDbD9735AFf958023239c6A063")],
            default_want: None,
            block_time_secs: 2,
        }
    }

    pub fn base() -> Self {
        Self {
            chain_id: 8453,
            name: "Base".to_string(),
            wrapped_native: Some(address!("4200000000000000000000000000000000000006")),
            protected_tokens: vec![address!("50c5725949A6F0c72E6C4a641F24049A917DB0Cb")],
            default_want: None,
            block_time_secs: 2,
        }
    }

    pub fn arbitrum() -> Self {
        Self {
            chain_id: 42161,
            name: "Arbitrum One".to_string(),
            wrapped_native: Some(address!("82aF49447D8a07e3bd95BD0d56f35241523fBab1")),
            protected_tokens: vec![address!("DA10009cBd5D07dd0CeCc66161FC93D7c9000da1")],
            default_want: None,
            block_time_secs: 1,
        }
    }

    /// Dev chains (anvil/hardhat without a fork) carry no well-known tokens.
    pub fn local(chain_id: u64) -> Self {
        Self {
            chain_id,
            name: format!("local-{chain_id}"),
            wrapped_native: None,
            protected_tokens: Vec::new(),
            default_want: None,
            block_time_secs: 12,
        }
    }
}
