//! JSON-RPC access: ABI-driven read calls and signed transaction submission.

use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers_core::abi::{Token, Tokenize};
use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{
    Address, BlockNumber, Bytes, H256, TransactionReceipt, TransactionRequest, U256, U64,
};
use ethers_providers::{Http, Middleware, Provider};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::contracts::{ContractHandle, method};
use crate::error::KeeperError;
use crate::executor::TxSender;
use crate::scanner::{OrderRegistry, RewardKind, RewardReader, RewardSource};
use crate::signer::Signer;
use crate::tx::{TxEnvelope, build_call_tx};

pub struct ChainClient {
    provider: Provider<Http>,
    signer: Arc<dyn Signer>,
    chain_id: u64,
    poll_interval: Duration,
}

impl ChainClient {
    /// Connect over HTTP and read the chain id once. Every RPC request is
    /// bounded by `http_timeout`.
    pub async fn connect(
        rpc_url: &str,
        signer: Arc<dyn Signer>,
        http_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Self> {
        let url: Url = rpc_url.parse().context("invalid rpc url")?;
        let client = reqwest::Client::builder().timeout(http_timeout).build()?;
        let provider = Provider::new(Http::new_with_client(url, client));
        let chain_id = provider.get_chainid().await.context("eth_chainId failed")?.as_u64();
        tracing::info!(chain_id, from = ?signer.address(), "connected to rpc");
        Ok(Self { provider, signer, chain_id, poll_interval })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// `eth_call` a view method and decode all of its outputs.
    pub async fn call<T: Tokenize>(
        &self,
        contract: &ContractHandle,
        name: &'static str,
        args: T,
    ) -> Result<Vec<Token>> {
        let data = contract.encode(name, args)?;
        let tx: TypedTransaction = TransactionRequest::new().to(contract.address).data(data).into();
        let out = self
            .provider
            .call(&tx, None)
            .await
            .with_context(|| format!("eth_call {name} on {:?} failed", contract.address))?;
        contract.decode_output(name, &out)
    }

    pub async fn call_uint<T: Tokenize>(
        &self,
        contract: &ContractHandle,
        name: &'static str,
        args: T,
    ) -> Result<U256> {
        let tokens = self.call(contract, name, args).await?;
        first_uint(name, tokens)
    }

    async fn poll_receipt(&self, hash: H256) -> Result<TransactionReceipt> {
        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(hash)
                .await
                .context("eth_getTransactionReceipt failed")?;
            if let Some(receipt) = receipt {
                if receipt.status == Some(U64::zero()) {
                    return Err(KeeperError::Reverted(hash).into());
                }
                return Ok(receipt);
            }
            sleep(self.poll_interval).await;
        }
    }
}

fn first_uint(method: &'static str, tokens: Vec<Token>) -> Result<U256> {
    match tokens.into_iter().next() {
        Some(Token::Uint(v)) => Ok(v),
        other => Err(KeeperError::UnexpectedOutput { method, detail: format!("{other:?}") }.into()),
    }
}

fn first_bool(method: &'static str, tokens: Vec<Token>) -> Result<bool> {
    match tokens.into_iter().next() {
        Some(Token::Bool(v)) => Ok(v),
        other => Err(KeeperError::UnexpectedOutput { method, detail: format!("{other:?}") }.into()),
    }
}

#[async_trait]
impl TxSender for ChainClient {
    fn sender(&self) -> Address {
        self.signer.address()
    }

    async fn send(&self, to: Address, data: Bytes, gas_limit: U256) -> Result<H256> {
        let from = self.signer.address();
        let gas_price = self.provider.get_gas_price().await.context("eth_gasPrice failed")?;
        let nonce = self
            .provider
            .get_transaction_count(from, Some(BlockNumber::Pending.into()))
            .await
            .context("eth_getTransactionCount failed")?;

        let envelope = TxEnvelope { nonce, gas_price, chain_id: self.chain_id };
        let tx = build_call_tx(from, to, data, gas_limit, envelope);
        let raw = self.signer.sign_typed_transaction(&tx).await?;

        let pending = self
            .provider
            .send_raw_transaction(Bytes::from(raw))
            .await
            .context("send_raw_transaction failed")?;
        let hash = pending.tx_hash();
        tracing::debug!(?hash, %nonce, %gas_price, "broadcast transaction");
        Ok(hash)
    }

    /// Poll for the receipt until it lands or `timeout` elapses, including
    /// time spent inside a single slow RPC request.
    async fn wait_for_receipt(&self, hash: H256, timeout: Duration) -> Result<TransactionReceipt> {
        match tokio::time::timeout(timeout, self.poll_receipt(hash)).await {
            Ok(result) => result,
            Err(_) => Err(KeeperError::ReceiptTimeout { hash, secs: timeout.as_secs() }.into()),
        }
    }
}

/// Reads pending rewards from the converter and the gating token balance.
pub struct ConverterReader {
    chain: Arc<ChainClient>,
    converter: ContractHandle,
    gating_token: ContractHandle,
}

impl ConverterReader {
    pub fn new(
        chain: Arc<ChainClient>,
        converter: ContractHandle,
        gating_token: ContractHandle,
    ) -> Self {
        Self { chain, converter, gating_token }
    }
}

#[async_trait]
impl RewardReader for ConverterReader {
    async fn pending_rewards(&self, source: &RewardSource) -> Result<U256> {
        match source.kind {
            RewardKind::Portal => {
                let portal = source.source_address;
                self.chain.call_uint(&self.converter, method::V2_GET_REWARDS, portal).await
            }
            RewardKind::Legacy => {
                self.chain.call_uint(&self.converter, method::V1_GET_REWARDS, ()).await
            }
        }
    }

    async fn gating_balance(&self, account: Address) -> Result<U256> {
        self.chain.call_uint(&self.gating_token, method::BALANCE_OF, account).await
    }
}

/// Reads order state from the arbitrage order registry.
pub struct RegistryReader {
    chain: Arc<ChainClient>,
    registry: ContractHandle,
}

impl RegistryReader {
    pub fn new(chain: Arc<ChainClient>, registry: ContractHandle) -> Self {
        Self { chain, registry }
    }
}

#[async_trait]
impl OrderRegistry for RegistryReader {
    async fn order_count(&self) -> Result<u64> {
        let count = self.chain.call_uint(&self.registry, method::ORDER_INDEX, ()).await?;
        if count > U256::from(u64::MAX) {
            let detail = count.to_string();
            let err = KeeperError::UnexpectedOutput { method: method::ORDER_INDEX, detail };
            return Err(err.into());
        }
        Ok(count.as_u64())
    }

    async fn can_execute(&self, order_id: u64) -> Result<bool> {
        let order = U256::from(order_id);
        let tokens = self.chain.call(&self.registry, method::CHECK_ARBITRAGE, order).await?;
        first_bool(method::CHECK_ARBITRAGE, tokens)
    }
}
