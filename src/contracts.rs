//! ABI artifacts and the contract methods the keeper calls.

use anyhow::{Context, Result};
use ethers_contract::BaseContract;
use ethers_core::abi::{Abi, Token, Tokenize};
use ethers_core::types::{Address, Bytes};
use std::path::Path;

pub mod method {
    pub const BALANCE_OF: &str = "balanceOf";
    pub const V1_GET_REWARDS: &str = "V1_getRewardsUSDCE";
    pub const V1_CONVERT: &str = "V1_convertUSDCE";
    pub const V2_GET_REWARDS: &str = "V2_getRewards";
    pub const V2_CONVERT: &str = "V2_convert";
    pub const ORDER_INDEX: &str = "orderIndex";
    pub const CHECK_ARBITRAGE: &str = "checkArbitrage";
    pub const EXECUTE_ARBITRAGE: &str = "executeArbitrage";
}

/// A deployed contract: address plus the ABI used to encode calls to it.
#[derive(Debug, Clone)]
pub struct ContractHandle {
    pub address: Address,
    base: BaseContract,
}

impl ContractHandle {
    pub fn new(address: Address, abi: Abi) -> Self {
        Self { address, base: BaseContract::from(abi) }
    }

    /// Load the ABI from a JSON artifact (a bare ABI array, or an object with an `abi` field).
    pub fn load(address: Address, path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read ABI file {}", path.display()))?;
        let abi = parse_abi(&contents)
            .with_context(|| format!("invalid ABI in {}", path.display()))?;
        Ok(Self::new(address, abi))
    }

    pub fn abi(&self) -> &Abi {
        self.base.abi()
    }

    pub fn encode<T: Tokenize>(&self, method: &str, args: T) -> Result<Bytes> {
        self.base
            .encode(method, args)
            .with_context(|| format!("failed to encode call to {method}"))
    }

    /// Decode every output of `method`; callers pick the values they need.
    pub fn decode_output(&self, method: &str, data: &[u8]) -> Result<Vec<Token>> {
        self.base
            .decode_output_raw(method, data)
            .with_context(|| format!("failed to decode output of {method}"))
    }
}

pub fn parse_abi(json: &str) -> Result<Abi> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let abi_value = match value {
        serde_json::Value::Object(mut obj) if obj.contains_key("abi") => {
            obj.remove("abi").unwrap_or_default()
        }
        other => other,
    };
    Ok(serde_json::from_value(abi_value)?)
}
