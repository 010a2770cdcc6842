use crate::error::SetupError;
use alloy::primitives::Bytes;
use std::path::Path;

/// Creation bytecode for a contract the fixture graph deploys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub bytecode: Bytes,
}

impl Artifact {
    pub fn new(name: impl Into<String>, bytecode: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytecode: bytecode.into(),
        }
    }

    /// Load a forge (`bytecode.object`) or brownie (`bytecode`) build artifact.
    pub fn from_json_file(path: &Path) -> Result<Self, SetupError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            SetupError::Artifact(format!("failed to read {}: {err}", path.display()))
        })?;
        let value: serde_json::Value = serde_json::from_str(&raw).map_err(|err| {
            SetupError::Artifact(format!("{} is not valid JSON: {err}", path.display()))
        })?;
        let fallback_name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("contract");
        Self::from_json_value(fallback_name, &value)
    }

    pub fn from_json_value(
        fallback_name: &str,
        value: &serde_json::Value,
    ) -> Result<Self, SetupError> {
        let name = value
            .get("contractName")
            .and_then(|v| v.as_str())
            .unwrap_or(fallback_name)
            .to_string();
        let bytecode_hex = match value.get("bytecode") {
            Some(serde_json::Value::String(hex_str)) => hex_str.as_str(),
            Some(obj) => obj.get("object").and_then(|v| v.as_str()).ok_or_else(|| {
                SetupError::Artifact(format!("{name}: bytecode.object missing"))
            })?,
            None => {
                return Err(SetupError::Artifact(format!(
                    "{name}: artifact carries no bytecode"
                )))
            }
        };
        let cleaned = crate::utils::hex::clean_hex(bytecode_hex);
        if cleaned.is_empty() {
            return Err(SetupError::Artifact(format!(
                "{name}: bytecode is empty (abstract contract or interface?)"
            )));
        }
        if cleaned.contains("__") {
            return Err(SetupError::Artifact(format!(
                "{name}: bytecode has unlinked library placeholders"
            )));
        }
        let bytes = hex::decode(cleaned)
            .map_err(|err| SetupError::Artifact(format!("{name}: invalid bytecode hex: {err}")))?;
        Ok(Self::new(name, bytes))
    }

    /// Creation code followed by ABI-encoded constructor arguments.
    pub fn init_code(&self, constructor_args: &[u8]) -> Bytes {
        let mut code = Vec::with_capacity(self.bytecode.len() + constructor_args.len());
        code.extend_from_slice(&self.bytecode);
        code.extend_from_slice(constructor_args);
        Bytes::from(code)
    }
}
