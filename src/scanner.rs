use anyhow::Result;
use async_trait::async_trait;
use ethers_core::types::{Address, U256};
use serde::Deserialize;

/// How a reward source is read and converted on the converter contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardKind {
    /// Per-portal rewards: `V2_getRewards(portal)` / `V2_convert(portal, account, amount)`.
    Portal,
    /// Single pre-portal USDC.e pool: `V1_getRewardsUSDCE()` / `V1_convertUSDCE(account, 1)`.
    Legacy,
}

/// One claimable reward stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RewardSource {
    pub name: String,
    pub source_address: Address,
    pub token_address: Address,
    pub decimals: u32,
    #[serde(default = "default_kind")]
    pub kind: RewardKind,
}

fn default_kind() -> RewardKind {
    RewardKind::Portal
}

/// Read-only access to pending rewards and the gating token balance.
#[async_trait]
pub trait RewardReader: Send + Sync {
    async fn pending_rewards(&self, source: &RewardSource) -> Result<U256>;

    async fn gating_balance(&self, account: Address) -> Result<U256>;
}

/// Read-only access to the order registry.
#[async_trait]
pub trait OrderRegistry: Send + Sync {
    /// Number of orders ever registered (`orderIndex()`).
    async fn order_count(&self) -> Result<u64>;

    /// First return value of `checkArbitrage(order_id)`.
    async fn can_execute(&self, order_id: u64) -> Result<bool>;
}

/// Convert a raw integer amount to whole units. Lossy past ~15 significant digits.
pub fn to_units(raw: U256, decimals: u32) -> f64 {
    u256_to_f64(raw) / 10f64.powi(decimals as i32)
}

fn u256_to_f64(v: U256) -> f64 {
    // Little-endian 64-bit limbs.
    v.0.iter().rev().fold(0.0, |acc, limb| acc * 18446744073709551616.0 + *limb as f64)
}
