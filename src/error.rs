use ethers_core::types::{Address, H256};
use thiserror::Error;

/// Failures the keeper distinguishes by kind. Everything else travels as
/// `anyhow::Error` with context attached.
#[derive(Debug, Error)]
pub enum KeeperError {
    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid value for {name}: {reason}")]
    InvalidEnv { name: &'static str, reason: String },

    #[error("price api error: {0}")]
    PriceApi(String),

    #[error("price api response has no price for token {0:?}")]
    MissingPrice(Address),

    #[error("no receipt for {hash:?} after {secs}s")]
    ReceiptTimeout { hash: H256, secs: u64 },

    #[error("transaction {0:?} reverted")]
    Reverted(H256),

    #[error("unexpected output from {method}: {detail}")]
    UnexpectedOutput { method: &'static str, detail: String },
}
