pub mod chain;
pub mod config;
pub mod contracts;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod keeper;
pub mod price;
pub mod report;
pub mod scanner;
pub mod signer;
pub mod tx;

use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

use crate::chain::{ChainClient, ConverterReader, RegistryReader};
use crate::config::{Credentials, Settings, resolve_rpc_url};
use crate::contracts::ContractHandle;
use crate::evaluator::{Evaluator, Threshold};
use crate::executor::{ConversionExecutor, ExecutorOptions, TxSender};
use crate::keeper::{ArbitrageWorkflow, ConvertWorkflow};
use crate::price::{PriceClient, reference_price};
use crate::report::RunReport;
use crate::signer::{LocalKeySigner, Signer};

/// Everything one run needs. Built once in `main` and dropped when the run ends.
pub struct RunContext {
    pub settings: Settings,
    pub credentials: Credentials,
}

impl RunContext {
    async fn connect(&self) -> Result<Arc<ChainClient>> {
        let s = &self.settings;
        let signer: Arc<dyn Signer> =
            Arc::new(LocalKeySigner::from_secret(&self.credentials.private_key)?);
        let rpc_url = resolve_rpc_url(s, &self.credentials)?;
        let chain =
            ChainClient::connect(&rpc_url, signer, s.http_timeout(), s.receipt_poll_interval())
                .await?;
        if chain.chain_id() != s.chain_id {
            tracing::warn!(
                expected = s.chain_id,
                actual = chain.chain_id(),
                "rpc chain id differs from configured chain id"
            );
        }
        Ok(Arc::new(chain))
    }

    fn confirm_timeout(&self) -> Option<std::time::Duration> {
        self.settings.wait_for_confirmation.then(|| self.settings.confirm_timeout())
    }
}

/// Price the reward sources, then convert every one that clears the threshold.
pub async fn convert(ctx: &RunContext) -> Result<RunReport> {
    let s = &ctx.settings;
    let (bearer, fallback, margin) = ctx.credentials.require_convert()?;

    let converter = ContractHandle::load(s.converter_address, &s.converter_abi)?;
    let gating_token = ContractHandle::load(s.gating_token, &s.gating_token_abi)?;

    let bearer = SecretString::new(bearer.expose_secret().clone());
    let prices = PriceClient::new(&s.price_api_url, s.chain_id, bearer, s.http_timeout())?
        .fetch_prices(&s.price_tokens, &s.currency)
        .await?;
    let reference =
        reference_price(&prices, s.reference_token, s.reference_quantity, fallback)?;
    let threshold = Threshold::new(reference.value, margin);
    tracing::info!(
        reference = %format!("{:.3}", reference.value),
        from_fallback = reference.from_fallback,
        threshold = %format!("{:.3}", threshold.value()),
        "profit threshold"
    );

    let chain = ctx.connect().await?;
    let account = ctx.credentials.account.unwrap_or_else(|| chain.sender());
    let reader = ConverterReader::new(chain.clone(), converter.clone(), gating_token);
    let executor = ConversionExecutor::new(
        chain,
        converter,
        account,
        ExecutorOptions {
            gas_limit: s.convert_gas_limit,
            confirm_timeout: ctx.confirm_timeout(),
            dry_run: s.dry_run,
        },
    );

    let workflow = ConvertWorkflow {
        reader: &reader,
        executor: &executor,
        evaluator: Evaluator::new(threshold, s.min_gating_balance(), s.worth_epsilon_usd),
        prices: &prices,
        account,
    };
    Ok(workflow.run(&s.reward_sources).await)
}

/// Execute every order in the registry that currently reports `canExecute`.
pub async fn arbitrage(ctx: &RunContext) -> Result<RunReport> {
    let s = &ctx.settings;
    let registry = ContractHandle::load(s.registry_address, &s.registry_abi)?;

    let chain = ctx.connect().await?;
    let recipient = chain.sender();
    let reader = RegistryReader::new(chain.clone(), registry.clone());
    let executor = ConversionExecutor::new(
        chain,
        registry,
        recipient,
        ExecutorOptions {
            gas_limit: s.arbitrage_gas_limit,
            confirm_timeout: ctx.confirm_timeout(),
            dry_run: s.dry_run,
        },
    );

    ArbitrageWorkflow { registry: &reader, executor: &executor }.run().await
}
