//! Run configuration.
//!
//! Non-secret settings (addresses, reward sources, gas limits, timeouts) come
//! from an optional TOML file and default to the Possum deployment on
//! Arbitrum. Secrets and per-operator numbers come from the environment.

use anyhow::{Context, Result};
use ethers_core::types::{Address, U256};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::KeeperError;
use crate::scanner::{RewardKind, RewardSource};

pub const ARBITRUM_CHAIN_ID: u64 = 42161;

const PSM: &str = "0x17a8541b82bf67e10b0874284b4ae66858cb1fd5";
const USDCE: &str = "0xff970a61a04b1ca14834a43f5de4533ebddb5cc8";
const USDC: &str = "0xaf88d065e77c8cc2239327c5edb3a432268e5831";
const WETH: &str = "0x82af49447d8a07e3bd95bd0d56f35241523fbab1";
const WBTC: &str = "0x2f2a2543b76a4166549f7aab2e75bef0aefc5b0f";
const LINK: &str = "0xf97f4df75117a78c1a5a0dbb814af92458539fb4";
const ARB: &str = "0x912ce59144191c1204e64559fe8253a0e49e6548";

const CONVERTER: &str = "0xa94f0513b41e8C0c6E96B76ceFf2e28cAA3F5ebb";
const ORDER_REGISTRY: &str = "0x4f0fe6A8287f3bEbA2754220FC1AAF2a07A56c7C";

const PORTAL_USDCE: &str = "0xE8EfFf304D01aC2D9BA256b602D736dB81f20984";
const PORTAL_USDC: &str = "0x9167CFf02D6f55912011d6f498D98454227F4e16";
const PORTAL_WETH: &str = "0xe771545aaDF6feC3815B982fe2294F7230C9c55b";
const PORTAL_WBTC: &str = "0x919B37b5f2f1DEd2a1f6230Bf41790e27b016609";
const PORTAL_LINK: &str = "0x51623b54753E07Ba9B3144Ba8bAB969D427982b6";
const PORTAL_ARB: &str = "0x523a93037c47Ba173E9080FE8EBAeae834c24082";

fn addr(s: &str) -> Address {
    // Only called on the compile-time constants above.
    s.parse().unwrap_or_default()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Overrides `RPC_URL` / `INFURA_API_KEY` when set.
    pub rpc_url: Option<String>,
    pub chain_id: u64,

    pub price_api_url: String,
    pub currency: String,
    pub price_tokens: Vec<Address>,
    pub reference_token: Address,
    pub reference_quantity: f64,

    pub gating_token: Address,
    /// Whole tokens required before any conversion is attempted.
    pub gating_min_tokens: u64,
    pub gating_decimals: u32,

    pub converter_address: Address,
    pub reward_sources: Vec<RewardSource>,
    pub convert_gas_limit: u64,

    pub registry_address: Address,
    pub arbitrage_gas_limit: u64,

    pub converter_abi: PathBuf,
    pub gating_token_abi: PathBuf,
    pub registry_abi: PathBuf,

    pub http_timeout_secs: u64,
    pub confirm_timeout_secs: u64,
    pub receipt_poll_ms: u64,
    pub wait_for_confirmation: bool,
    pub worth_epsilon_usd: f64,
    pub dry_run: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let portal = |name: &str, source: &str, token: &str, decimals: u32| RewardSource {
            name: name.to_string(),
            source_address: addr(source),
            token_address: addr(token),
            decimals,
            kind: RewardKind::Portal,
        };
        Self {
            rpc_url: None,
            chain_id: ARBITRUM_CHAIN_ID,
            price_api_url: "https://api.1inch.dev/price/v1.1".to_string(),
            currency: "USD".to_string(),
            price_tokens: [WETH, WBTC, LINK, ARB, USDCE, USDC, PSM].into_iter().map(addr).collect(),
            reference_token: addr(PSM),
            reference_quantity: 100_000.0,
            gating_token: addr(PSM),
            gating_min_tokens: 100_000,
            gating_decimals: 18,
            converter_address: addr(CONVERTER),
            reward_sources: vec![
                RewardSource {
                    name: "USDCE V1".to_string(),
                    source_address: addr(CONVERTER),
                    token_address: addr(USDCE),
                    decimals: 6,
                    kind: RewardKind::Legacy,
                },
                portal("USDCE", PORTAL_USDCE, USDCE, 6),
                portal("USDC", PORTAL_USDC, USDC, 6),
                portal("WETH", PORTAL_WETH, WETH, 18),
                portal("WBTC", PORTAL_WBTC, WBTC, 8),
                portal("LINK", PORTAL_LINK, LINK, 18),
                portal("ARB", PORTAL_ARB, ARB, 18),
            ],
            convert_gas_limit: 2_500_000,
            registry_address: addr(ORDER_REGISTRY),
            arbitrage_gas_limit: 2_000_000,
            converter_abi: PathBuf::from("abi/Converter.json"),
            gating_token_abi: PathBuf::from("abi/psm.json"),
            registry_abi: PathBuf::from("abi/Arbitrage.json"),
            http_timeout_secs: 10,
            confirm_timeout_secs: 120,
            receipt_poll_ms: 1_000,
            wait_for_confirmation: true,
            worth_epsilon_usd: 1e-6,
            dry_run: false,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file; keys not present keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Minimum gating balance in raw token units.
    pub fn min_gating_balance(&self) -> U256 {
        U256::from(self.gating_min_tokens) * U256::exp10(self.gating_decimals as usize)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }
}

/// Operator secrets and per-operator numbers, read from the environment.
#[derive(Debug)]
pub struct Credentials {
    pub bearer: Option<SecretString>,
    pub private_key: SecretString,
    pub rpc_url: Option<String>,
    pub account: Option<Address>,
    pub fallback_reference_price: Option<f64>,
    pub profit_margin: Option<f64>,
}

impl Credentials {
    pub fn from_env() -> Result<Self, KeeperError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, KeeperError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let private_key = get("PRIVATE_KEY").ok_or(KeeperError::MissingEnv("PRIVATE_KEY"))?;
        let rpc_url = get("RPC_URL").or_else(|| {
            get("INFURA_API_KEY")
                .map(|key| format!("https://arbitrum-mainnet.infura.io/v3/{key}"))
        });
        let account = get("ACCOUNT")
            .map(|v| {
                v.parse::<Address>()
                    .map_err(|e| KeeperError::InvalidEnv { name: "ACCOUNT", reason: e.to_string() })
            })
            .transpose()?;

        Ok(Self {
            bearer: get("BEARER").map(SecretString::new),
            private_key: SecretString::new(private_key),
            rpc_url,
            account,
            fallback_reference_price: parse_f64(get("PSM_PRICE"), "PSM_PRICE")?,
            profit_margin: parse_f64(get("PROFIT"), "PROFIT")?,
        })
    }

    /// Values the conversion workflow cannot run without. The fallback
    /// reference price stays optional; it is only needed on a zero quote.
    pub fn require_convert(&self) -> Result<(&SecretString, Option<f64>, f64), KeeperError> {
        let bearer = self.bearer.as_ref().ok_or(KeeperError::MissingEnv("BEARER"))?;
        let margin = self.profit_margin.ok_or(KeeperError::MissingEnv("PROFIT"))?;
        Ok((bearer, self.fallback_reference_price, margin))
    }
}

fn parse_f64(value: Option<String>, name: &'static str) -> Result<Option<f64>, KeeperError> {
    value
        .map(|v| {
            v.parse::<f64>().map_err(|e| KeeperError::InvalidEnv { name, reason: e.to_string() })
        })
        .transpose()
}

/// Resolve the JSON-RPC endpoint: settings file first, then environment.
pub fn resolve_rpc_url(
    settings: &Settings,
    credentials: &Credentials,
) -> Result<String, KeeperError> {
    settings
        .rpc_url
        .clone()
        .or_else(|| credentials.rpc_url.clone())
        .ok_or(KeeperError::MissingEnv("RPC_URL"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_cover_all_portals_and_legacy_source() {
        let s = Settings::default();
        assert_eq!(s.reward_sources.len(), 7);
        assert_eq!(s.reward_sources.iter().filter(|r| r.kind == RewardKind::Legacy).count(), 1);
        assert_eq!(s.min_gating_balance(), U256::exp10(23));
        assert_eq!(s.chain_id, ARBITRUM_CHAIN_ID);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let s = Settings::from_toml("confirm_timeout_secs = 30\ndry_run = true\n").unwrap();
        assert_eq!(s.confirm_timeout_secs, 30);
        assert!(s.dry_run);
        assert_eq!(s.convert_gas_limit, 2_500_000);
    }

    #[test]
    fn toml_can_replace_reward_sources() {
        let s = Settings::from_toml(
            r#"
            [[reward_sources]]
            name = "WETH"
            source_address = "0xe771545aaDF6feC3815B982fe2294F7230C9c55b"
            token_address = "0x82af49447d8a07e3bd95bd0d56f35241523fbab1"
            decimals = 18
            kind = "portal"
            "#,
        )
        .unwrap();
        assert_eq!(s.reward_sources.len(), 1);
        assert_eq!(s.reward_sources[0].decimals, 18);
    }

    #[test]
    fn missing_private_key_fails_fast() {
        let err = Credentials::from_lookup(lookup(&[("BEARER", "x")])).unwrap_err();
        assert!(matches!(err, KeeperError::MissingEnv("PRIVATE_KEY")));
    }

    #[test]
    fn infura_key_builds_arbitrum_url() {
        let env = [("PRIVATE_KEY", "aa"), ("INFURA_API_KEY", "abc")];
        let c = Credentials::from_lookup(lookup(&env)).unwrap();
        assert_eq!(c.rpc_url.as_deref(), Some("https://arbitrum-mainnet.infura.io/v3/abc"));
    }

    #[test]
    fn convert_requirements_reported_by_name() {
        let env = [("PRIVATE_KEY", "aa"), ("BEARER", "t"), ("PSM_PRICE", "12.5")];
        let c = Credentials::from_lookup(lookup(&env)).unwrap();
        assert!(matches!(c.require_convert(), Err(KeeperError::MissingEnv("PROFIT"))));
    }

    #[test]
    fn convert_runs_without_fallback_price() {
        let env = [("PRIVATE_KEY", "aa"), ("BEARER", "t"), ("PROFIT", "50")];
        let c = Credentials::from_lookup(lookup(&env)).unwrap();
        let (_, fallback, margin) = c.require_convert().unwrap();
        assert_eq!(fallback, None);
        assert_eq!(margin, 50.0);
    }

    #[test]
    fn bad_number_is_invalid_env() {
        let env = [("PRIVATE_KEY", "aa"), ("PROFIT", "lots")];
        let err = Credentials::from_lookup(lookup(&env)).unwrap_err();
        assert!(matches!(err, KeeperError::InvalidEnv { name: "PROFIT", .. }));
    }
}
