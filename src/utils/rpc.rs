use crate::error::AdapterError;
use alloy::primitives::{Bytes, U256};
use alloy::providers::{ProviderBuilder, RootProvider};
use alloy::transports::http::Http;
use alloy::transports::TransportError;
use reqwest::Client;
use std::future::Future;
use tokio::time::{timeout, Duration};

const RPC_ERR_MAX_LEN: usize = 260;

pub type HttpProvider = RootProvider<Http<Client>>;

pub fn build_http_provider(rpc_url: &str) -> anyhow::Result<HttpProvider> {
    let trimmed = rpc_url.trim();
    if trimmed.is_empty() {
        anyhow::bail!("empty RPC url");
    }
    let parsed = trimmed
        .parse::<reqwest::Url>()
        .map_err(|err| anyhow::anyhow!("invalid RPC url `{}`: {}", trimmed, err))?;
    Ok(ProviderBuilder::new().on_http(parsed))
}

pub fn compact_rpc_error_message(message: &str) -> String {
    crate::utils::error::compact_error_message(message, RPC_ERR_MAX_LEN)
}

/// Run one RPC attempt under a deadline. Never retries: a timeout is reported to the caller,
/// which treats it as a fatal transport failure for the scenario.
pub async fn run_with_timeout<T, Fut>(
    context: &str,
    timeout_ms: u64,
    fut: Fut,
) -> Result<T, AdapterError>
where
    Fut: Future<Output = Result<T, TransportError>>,
{
    match timeout(Duration::from_millis(timeout_ms), fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(classify_rpc_error(context, &err)),
        Err(_) => Err(AdapterError::Timeout {
            waited_ms: timeout_ms,
            context: context.to_string(),
        }),
    }
}

/// Split JSON-RPC failures into reverts (the node executed the call and it reverted) and
/// transport failures (everything else).
pub fn classify_rpc_error(context: &str, err: &TransportError) -> AdapterError {
    if let Some(payload) = err.as_error_resp() {
        let message = payload.message.to_string();
        let data = payload
            .data
            .as_ref()
            .and_then(|raw| serde_json::from_str::<String>(raw.get()).ok())
            .and_then(|hex_str| hex::decode(crate::utils::hex::clean_hex(&hex_str)).ok());
        if let Some(data) = data {
            return AdapterError::Revert {
                reason: crate::contracts::decode_revert_reason(&data)
                    .or_else(|| revert_reason_from_message(&message)),
                data: Bytes::from(data),
            };
        }
        if message.to_ascii_lowercase().contains("revert") {
            return AdapterError::Revert {
                reason: revert_reason_from_message(&message),
                data: Bytes::new(),
            };
        }
        return AdapterError::Backend(format!(
            "{context}: rpc error {}: {}",
            payload.code,
            compact_rpc_error_message(&message)
        ));
    }
    AdapterError::Transport(format!(
        "{context}: {}",
        compact_rpc_error_message(&err.to_string())
    ))
}

/// `execution reverted: !want` -> `!want`; bare `execution reverted` carries no reason.
pub fn revert_reason_from_message(message: &str) -> Option<String> {
    let lower = message.to_ascii_lowercase();
    for marker in ["execution reverted: ", "reverted with reason string '", "revert "] {
        if let Some(idx) = lower.find(marker) {
            let tail = &message[idx + marker.len()..];
            let reason = tail.trim_end_matches('\'').trim();
            if !reason.is_empty() {
                return Some(reason.to_string());
            }
        }
    }
    None
}

pub fn parse_quantity_u64(raw: &str) -> anyhow::Result<u64> {
    u64::from_str_radix(crate::utils::hex::clean_hex(raw), 16)
        .map_err(|err| anyhow::anyhow!("invalid hex quantity `{raw}`: {err}"))
}

pub fn parse_quantity_u256(raw: &str) -> anyhow::Result<U256> {
    U256::from_str_radix(crate::utils::hex::clean_hex(raw), 16)
        .map_err(|err| anyhow::anyhow!("invalid hex quantity `{raw}`: {err}"))
}
