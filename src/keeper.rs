//! One-pass workflows. Candidates are evaluated strictly in order and in
//! isolation: a failed read or transaction is recorded and the scan moves on.

use anyhow::{Context, Result};
use ethers_core::types::{Address, U256};

use crate::evaluator::{Evaluator, worth_usd};
use crate::executor::{Conversion, ConversionExecutor};
use crate::price::PriceTable;
use crate::report::{Outcome, RunReport, SkipReason, Stage};
use crate::scanner::{OrderRegistry, RewardKind, RewardReader, RewardSource, to_units};

/// USD price assumed for the legacy source's token when the quote API has none.
const LEGACY_UNIT_PRICE: f64 = 1.0;

pub struct ConvertWorkflow<'a> {
    pub reader: &'a dyn RewardReader,
    pub executor: &'a ConversionExecutor,
    pub evaluator: Evaluator,
    pub prices: &'a PriceTable,
    /// Holder of the gating balance and recipient of converted rewards.
    pub account: Address,
}

impl ConvertWorkflow<'_> {
    pub async fn run(&self, sources: &[RewardSource]) -> RunReport {
        let mut report = RunReport::new("convert");
        for source in sources {
            let outcome = self.process(source).await;
            report.record(source.name.clone(), outcome);
        }
        report
    }

    async fn process(&self, source: &RewardSource) -> Outcome {
        let reward = match self.reader.pending_rewards(source).await {
            Ok(r) => r,
            Err(e) => return read_failure(&source.name, e),
        };

        let price = match (self.prices.get(&source.token_address), source.kind) {
            (Some(p), _) => p,
            (None, RewardKind::Legacy) => LEGACY_UNIT_PRICE,
            (None, RewardKind::Portal) => {
                let e = anyhow::anyhow!("no price for token {:?}", source.token_address);
                return read_failure(&source.name, e);
            }
        };
        let worth = worth_usd(reward, source.decimals, price);
        tracing::info!(
            source = %source.name,
            reward = %format!("{:.4}", to_units(reward, source.decimals)),
            worth = %format!("{worth:.4}"),
            "pending reward"
        );

        // Conversions spend the gating token, so re-read it for every candidate.
        let balance = match self.reader.gating_balance(self.account).await {
            Ok(b) => b,
            Err(e) => return read_failure(&source.name, e),
        };

        tracing::info!(source = %source.name, %balance, "gating balance");

        let decision = self.evaluator.evaluate(worth, balance);
        if !decision.gating_ok {
            tracing::info!(
                source = %source.name,
                %balance,
                required = %self.evaluator.min_gating_balance,
                "gating balance too low"
            );
            return Outcome::Skipped(SkipReason::GatingBalance);
        }
        if !decision.profitable {
            tracing::debug!(
                source = %source.name,
                worth,
                threshold = decision.threshold,
                "below threshold"
            );
            return Outcome::Skipped(SkipReason::NotProfitable);
        }

        let conversion = match source.kind {
            RewardKind::Portal => {
                Conversion::Portal { portal: source.source_address, amount: reward }
            }
            RewardKind::Legacy => Conversion::Legacy { count: U256::one() },
        };
        let outcome = self.executor.execute(&source.name, conversion).await;
        if let Outcome::Submitted { .. } = outcome {
            let profit = format!("{:.4}", decision.profit);
            tracing::info!(source = %source.name, %profit, "converted");
        }
        outcome
    }
}

fn read_failure(label: &str, e: anyhow::Error) -> Outcome {
    tracing::error!(label, error = %format!("{e:#}"), "read failed");
    Outcome::failed(Stage::Read, None, &e)
}

pub struct ArbitrageWorkflow<'a> {
    pub registry: &'a dyn OrderRegistry,
    pub executor: &'a ConversionExecutor,
}

impl ArbitrageWorkflow<'_> {
    /// Walk order ids `0..orderIndex()`, executing each one that reports
    /// `canExecute`. Only the initial `orderIndex()` read is fatal.
    pub async fn run(&self) -> Result<RunReport> {
        let count = self.registry.order_count().await.context("failed to read order index")?;
        tracing::info!(orders = count, "scanning order registry");

        let mut report = RunReport::new("arbitrage");
        for order_id in 0..count {
            let label = format!("order {order_id}");
            tracing::info!(order_id, "checking arbitrage");
            let outcome = match self.registry.can_execute(order_id).await {
                Ok(true) => self.executor.execute(&label, Conversion::Order { order_id }).await,
                Ok(false) => Outcome::Skipped(SkipReason::NotExecutable),
                Err(e) => read_failure(&label, e),
            };
            report.record(label, outcome);
        }
        Ok(report)
    }
}
