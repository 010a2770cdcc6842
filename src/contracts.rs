//! ABI bindings for the contracts a vault harness talks to, plus call helpers that route
//! encoded calldata through a [`ChainAdapter`].

use crate::adapter::{ChainAdapter, Receipt, TxRequest};
use crate::error::AdapterError;
use crate::identity::Identity;
use alloy::primitives::{Address, Bytes};
use alloy::sol_types::{Panic, Revert, SolCall, SolError};

alloy::sol! {
    interface IERC20 {
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function balanceOf(address owner) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    /// Views most strategies expose beyond the base interface.
    interface IStrategyViews {
        function balanceOfWant() external view returns (uint256);
        function balanceOfStake() external view returns (uint256);
    }

    interface IWETH {
        function deposit() external payable;
    }

    interface IVault {
        function initialize(
            address token,
            address governance,
            address rewards,
            string nameOverride,
            string symbolOverride,
            address guardian
        ) external;
        function setDepositLimit(uint256 limit) external;
        function setManagement(address management) external;
        function addStrategy(
            address strategy,
            uint256 debtRatio,
            uint256 minDebtPerHarvest,
            uint256 maxDebtPerHarvest,
            uint256 rateLimit
        ) external;
        function updateStrategyDebtRatio(address strategy, uint256 debtRatio) external;
        function deposit(uint256 amount) external returns (uint256);
        function withdraw(uint256 maxShares) external returns (uint256);
        function pricePerShare() external view returns (uint256);
        function totalAssets() external view returns (uint256);
        function debtRatio() external view returns (uint256);
        function balanceOf(address owner) external view returns (uint256);
        function token() external view returns (address);
    }

    interface IStrategy {
        function want() external view returns (address);
        function vault() external view returns (address);
        function setKeeper(address keeper) external;
        function harvest() external;
        function tend() external;
        function sweep(address token) external;
        function setEmergencyExit() external;
        function estimatedTotalAssets() external view returns (uint256);
        function harvestTrigger(uint256 callCost) external view returns (bool);
        function tendTrigger(uint256 callCost) external view returns (bool);
    }
}

/// Execute a read-only call and decode its return tuple.
pub fn read<A, C>(adapter: &mut A, target: Address, call: &C) -> Result<C::Return, AdapterError>
where
    A: ChainAdapter + ?Sized,
    C: SolCall,
{
    let output = adapter.call(target, Bytes::from(call.abi_encode()))?;
    C::abi_decode_returns(&output, true).map_err(|err| {
        AdapterError::Decode(format!(
            "{} on {target} returned {}: {err}",
            C::SIGNATURE,
            crate::utils::hex::short_hex(&output)
        ))
    })
}

/// Like [`read`], but `None` when the target reverts or returns nothing decodable, as it
/// does for a selector it does not implement. Transport errors still propagate.
pub fn read_optional<A, C>(
    adapter: &mut A,
    target: Address,
    call: &C,
) -> Result<Option<C::Return>, AdapterError>
where
    A: ChainAdapter + ?Sized,
    C: SolCall,
{
    match read(adapter, target, call) {
        Ok(value) => Ok(Some(value)),
        Err(AdapterError::Revert { .. } | AdapterError::Halt(_) | AdapterError::Decode(_)) => {
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

/// Submit a state-mutating call from `sender`.
pub fn send<A, C>(
    adapter: &mut A,
    sender: &Identity,
    target: Address,
    call: &C,
) -> Result<Receipt, AdapterError>
where
    A: ChainAdapter + ?Sized,
    C: SolCall,
{
    adapter.transact(
        sender,
        TxRequest::call(target, Bytes::from(call.abi_encode()), C::SIGNATURE),
    )
}

/// Decode `Error(string)` and `Panic(uint256)` revert payloads.
pub fn decode_revert_reason(output: &[u8]) -> Option<String> {
    if let Ok(revert) = Revert::abi_decode(output, true) {
        return Some(revert.reason);
    }
    if let Ok(panic) = Panic::abi_decode(output, true) {
        return Some(format!("panic_code=0x{:x}", panic.code));
    }
    None
}

pub fn encode_revert(reason: &str) -> Vec<u8> {
    Revert {
        reason: reason.to_string(),
    }
    .abi_encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{keccak256, U256};

    #[test]
    fn test_decode_revert_reason_reads_error_string() {
        let payload = encode_revert("!protected");
        assert_eq!(&payload[..4], &[0x08, 0xc3, 0x79, 0xa0]);
        assert_eq!(decode_revert_reason(&payload).as_deref(), Some("!protected"));
    }

    #[test]
    fn test_decode_revert_reason_panic_valid_word_decodes_hex_code() {
        let payload = Panic {
            code: U256::from(0x11u64),
        }
        .abi_encode();
        assert_eq!(
            decode_revert_reason(&payload).as_deref(),
            Some("panic_code=0x11")
        );
    }

    #[test]
    fn test_decode_revert_reason_rejects_unknown_selectors() {
        assert_eq!(decode_revert_reason(&[]), None);
        assert_eq!(decode_revert_reason(&[0xde, 0xad, 0xbe, 0xef, 0x00]), None);
    }

    #[test]
    fn test_strategy_selectors_match_canonical_signatures() {
        let sweep = IStrategy::sweepCall {
            token: Address::ZERO,
        }
        .abi_encode();
        assert_eq!(&sweep[..4], &keccak256("sweep(address)")[..4]);

        let add = IVault::addStrategyCall {
            strategy: Address::ZERO,
            debtRatio: U256::from(10_000u64),
            minDebtPerHarvest: U256::ZERO,
            maxDebtPerHarvest: U256::MAX,
            rateLimit: U256::from(1_000u64),
        }
        .abi_encode();
        assert_eq!(
            &add[..4],
            &keccak256("addStrategy(address,uint256,uint256,uint256,uint256)")[..4]
        );
        assert_eq!(add.len(), 4 + 5 * 32);
    }
}
