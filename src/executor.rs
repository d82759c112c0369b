use anyhow::Result;
use async_trait::async_trait;
use ethers_core::types::{Address, Bytes, H256, TransactionReceipt, U256};
use std::sync::Arc;
use std::time::Duration;

use crate::contracts::{ContractHandle, method};
use crate::report::{Outcome, SkipReason, Stage};

/// Builds, signs and broadcasts contract calls.
#[async_trait]
pub trait TxSender: Send + Sync {
    /// Account transactions are sent from.
    fn sender(&self) -> Address;

    /// Fill gas price, nonce and chain id, sign, broadcast, and return the hash.
    async fn send(&self, to: Address, data: Bytes, gas_limit: U256) -> Result<H256>;

    /// Block until a successful receipt is seen or `timeout` elapses.
    async fn wait_for_receipt(&self, hash: H256, timeout: Duration) -> Result<TransactionReceipt>;
}

/// A state-changing call the keeper can submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// `V2_convert(portal, recipient, amount)`.
    Portal { portal: Address, amount: U256 },
    /// `V1_convertUSDCE(recipient, count)`.
    Legacy { count: U256 },
    /// `executeArbitrage(recipient, order_id)`.
    Order { order_id: u64 },
}

impl Conversion {
    fn encode(&self, contract: &ContractHandle, recipient: Address) -> Result<Bytes> {
        match *self {
            Conversion::Portal { portal, amount } => {
                contract.encode(method::V2_CONVERT, (portal, recipient, amount))
            }
            Conversion::Legacy { count } => contract.encode(method::V1_CONVERT, (recipient, count)),
            Conversion::Order { order_id } => {
                contract.encode(method::EXECUTE_ARBITRAGE, (recipient, U256::from(order_id)))
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutorOptions {
    pub gas_limit: u64,
    /// Wait for a receipt with this timeout; `None` returns right after broadcast.
    pub confirm_timeout: Option<Duration>,
    pub dry_run: bool,
}

/// Submits one transaction per qualifying candidate against one contract.
pub struct ConversionExecutor {
    sender: Arc<dyn TxSender>,
    contract: ContractHandle,
    recipient: Address,
    options: ExecutorOptions,
}

impl ConversionExecutor {
    pub fn new(
        sender: Arc<dyn TxSender>,
        contract: ContractHandle,
        recipient: Address,
        options: ExecutorOptions,
    ) -> Self {
        Self { sender, contract, recipient, options }
    }

    /// Never returns an error: every failure is folded into the outcome so
    /// the caller can move on to the next candidate.
    pub async fn execute(&self, label: &str, conversion: Conversion) -> Outcome {
        let data = match conversion.encode(&self.contract, self.recipient) {
            Ok(d) => d,
            Err(e) => return Outcome::failed(Stage::Broadcast, None, &e),
        };

        if self.options.dry_run {
            let to = self.contract.address;
            tracing::info!(label, ?conversion, ?to, "dry run: transaction not sent");
            return Outcome::Skipped(SkipReason::DryRun);
        }

        let gas_limit = U256::from(self.options.gas_limit);
        let hash = match self.sender.send(self.contract.address, data, gas_limit).await {
            Ok(h) => h,
            Err(e) => {
                tracing::error!(label, error = %format!("{e:#}"), "broadcast failed");
                return Outcome::failed(Stage::Broadcast, None, &e);
            }
        };
        tracing::info!(label, tx_hash = ?hash, "transaction sent");

        let Some(timeout) = self.options.confirm_timeout else {
            return Outcome::Submitted { tx_hash: hash, block: None };
        };

        match self.sender.wait_for_receipt(hash, timeout).await {
            Ok(receipt) => {
                let block = receipt.block_number.map(|b| b.as_u64());
                tracing::info!(label, tx_hash = ?hash, ?block, "transaction confirmed");
                Outcome::Submitted { tx_hash: hash, block }
            }
            Err(e) => {
                let error = format!("{e:#}");
                tracing::error!(label, tx_hash = ?hash, %error, "confirmation failed");
                Outcome::failed(Stage::Confirm, Some(hash), &e)
            }
        }
    }
}
