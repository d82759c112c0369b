use anyhow::{Result, anyhow};
use async_trait::async_trait;
use ethers_core::types::{Address, Bytes, H256, TransactionReceipt, U64, U256};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use portal_keeper::contracts::ContractHandle;
use portal_keeper::error::KeeperError;
use portal_keeper::evaluator::{Evaluator, Threshold};
use portal_keeper::executor::{ConversionExecutor, ExecutorOptions, TxSender};
use portal_keeper::keeper::{ArbitrageWorkflow, ConvertWorkflow};
use portal_keeper::price::{PriceTable, reference_price};
use portal_keeper::report::{Outcome, SkipReason, Stage};
use portal_keeper::scanner::{OrderRegistry, RewardKind, RewardReader, RewardSource};

fn account() -> Address {
    Address::repeat_byte(0xaa)
}

fn usdc() -> Address {
    Address::repeat_byte(0x0c)
}

fn psm() -> Address {
    Address::repeat_byte(0x17)
}

fn gating_min() -> U256 {
    U256::exp10(23)
}

fn portal(name: &str, byte: u8) -> RewardSource {
    RewardSource {
        name: name.to_string(),
        source_address: Address::repeat_byte(byte),
        token_address: usdc(),
        decimals: 6,
        kind: RewardKind::Portal,
    }
}

fn contract(file: &str, byte: u8) -> ContractHandle {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("abi").join(file);
    ContractHandle::load(Address::repeat_byte(byte), &path).unwrap()
}

/// Pending rewards per source address; gating balances are served in order,
/// the last one repeating.
struct FakeReader {
    rewards: HashMap<Address, Result<U256, String>>,
    balances: Mutex<VecDeque<U256>>,
}

impl FakeReader {
    fn new(rewards: &[(Address, Result<U256, String>)], balances: &[U256]) -> Self {
        Self {
            rewards: rewards.iter().cloned().collect(),
            balances: Mutex::new(balances.iter().copied().collect()),
        }
    }
}

#[async_trait]
impl RewardReader for FakeReader {
    async fn pending_rewards(&self, source: &RewardSource) -> Result<U256> {
        match self.rewards.get(&source.source_address) {
            Some(Ok(v)) => Ok(*v),
            Some(Err(e)) => Err(anyhow!(e.clone())),
            None => Ok(U256::zero()),
        }
    }

    async fn gating_balance(&self, _account: Address) -> Result<U256> {
        let mut q = self.balances.lock().unwrap();
        if q.len() > 1 {
            Ok(q.pop_front().unwrap())
        } else {
            Ok(q.front().copied().unwrap_or_default())
        }
    }
}

#[derive(Default)]
struct FakeSender {
    sent: Mutex<Vec<Bytes>>,
    fail_first: bool,
    revert: bool,
}

#[async_trait]
impl TxSender for FakeSender {
    fn sender(&self) -> Address {
        account()
    }

    async fn send(&self, _to: Address, data: Bytes, _gas_limit: U256) -> Result<H256> {
        let mut sent = self.sent.lock().unwrap();
        let n = sent.len();
        sent.push(data);
        if self.fail_first && n == 0 {
            return Err(anyhow!("replacement transaction underpriced"));
        }
        Ok(H256::from_low_u64_be(n as u64 + 1))
    }

    async fn wait_for_receipt(&self, hash: H256, _timeout: Duration) -> Result<TransactionReceipt> {
        if self.revert {
            return Err(KeeperError::Reverted(hash).into());
        }
        Ok(TransactionReceipt {
            transaction_hash: hash,
            block_number: Some(U64::from(100)),
            ..Default::default()
        })
    }
}

fn executor(sender: Arc<FakeSender>, handle: ContractHandle) -> ConversionExecutor {
    let options = ExecutorOptions {
        gas_limit: 2_500_000,
        confirm_timeout: Some(Duration::from_secs(5)),
        dry_run: false,
    };
    ConversionExecutor::new(sender, handle, account(), options)
}

fn prices(usdc_price: f64, psm_price: f64) -> PriceTable {
    let mut t = PriceTable::default();
    t.insert(usdc(), usdc_price);
    t.insert(psm(), psm_price);
    t
}

#[tokio::test]
async fn threshold_boundary_is_inclusive() {
    // $1.00 * 100,000 reference + $50 margin = $100,050.
    let table = prices(1.0, 1.0);
    let reference = reference_price(&table, psm(), 100_000.0, Some(999.0)).unwrap();
    let evaluator = Evaluator::new(Threshold::new(reference.value, 50.0), gating_min(), 1e-6);

    let at = portal("AT", 1);
    let below = portal("BELOW", 2);
    let reader = FakeReader::new(
        &[
            (at.source_address, Ok(U256::from(100_050_000_000u64))),
            (below.source_address, Ok(U256::from(100_049_990_000u64))),
        ],
        &[gating_min()],
    );
    let sender = Arc::new(FakeSender::default());
    let ex = executor(sender.clone(), contract("Converter.json", 0xcc));

    let wf = ConvertWorkflow {
        reader: &reader,
        executor: &ex,
        evaluator,
        prices: &table,
        account: account(),
    };
    let report = wf.run(&[at, below]).await;

    assert!(matches!(report.candidates[0].outcome, Outcome::Submitted { .. }));
    assert_eq!(report.candidates[1].outcome, Outcome::Skipped(SkipReason::NotProfitable));
    assert_eq!(sender.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn gating_one_unit_short_sends_nothing() {
    let table = prices(1.0, 0.001);
    let evaluator = Evaluator::new(Threshold::new(100.0, 10.0), gating_min(), 1e-6);
    let rich = portal("USDC", 1);
    let reward = U256::from(1_000_000_000_000u64);
    let reader = FakeReader::new(&[(rich.source_address, Ok(reward))], &[gating_min() - 1]);
    let sender = Arc::new(FakeSender::default());
    let ex = executor(sender.clone(), contract("Converter.json", 0xcc));

    let wf = ConvertWorkflow {
        reader: &reader,
        executor: &ex,
        evaluator,
        prices: &table,
        account: account(),
    };
    let report = wf.run(&[rich]).await;

    assert_eq!(report.candidates[0].outcome, Outcome::Skipped(SkipReason::GatingBalance));
    assert!(sender.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn zero_quote_uses_fallback_for_threshold() {
    let table = prices(1.0, 0.0);
    let reference = reference_price(&table, psm(), 100_000.0, Some(500.0)).unwrap();
    assert!(reference.from_fallback);
    let evaluator = Evaluator::new(Threshold::new(reference.value, 10.0), gating_min(), 1e-6);

    // $505 would clear a threshold built from a zero price, but not $510.
    let source = portal("USDC", 1);
    let reward = U256::from(505_000_000u64);
    let reader = FakeReader::new(&[(source.source_address, Ok(reward))], &[gating_min()]);
    let sender = Arc::new(FakeSender::default());
    let ex = executor(sender.clone(), contract("Converter.json", 0xcc));

    let wf = ConvertWorkflow {
        reader: &reader,
        executor: &ex,
        evaluator,
        prices: &table,
        account: account(),
    };
    let report = wf.run(&[source]).await;

    assert_eq!(report.candidates[0].outcome, Outcome::Skipped(SkipReason::NotProfitable));
}

#[tokio::test]
async fn failures_do_not_stop_the_scan() {
    let table = prices(1.0, 0.001);
    let evaluator = Evaluator::new(Threshold::new(100.0, 0.0), gating_min(), 1e-6);
    let broken = portal("BROKEN", 1);
    let first = portal("FIRST", 2);
    let second = portal("SECOND", 3);
    let reader = FakeReader::new(
        &[
            (broken.source_address, Err("execution reverted".to_string())),
            (first.source_address, Ok(U256::from(200_000_000u64))),
            (second.source_address, Ok(U256::from(300_000_000u64))),
        ],
        &[gating_min()],
    );
    let sender = Arc::new(FakeSender { fail_first: true, ..Default::default() });
    let ex = executor(sender.clone(), contract("Converter.json", 0xcc));

    let wf = ConvertWorkflow {
        reader: &reader,
        executor: &ex,
        evaluator,
        prices: &table,
        account: account(),
    };
    let report = wf.run(&[broken, first, second]).await;

    assert!(matches!(report.candidates[0].outcome, Outcome::Failed { stage: Stage::Read, .. }));
    assert!(matches!(
        report.candidates[1].outcome,
        Outcome::Failed { stage: Stage::Broadcast, .. }
    ));
    assert!(matches!(report.candidates[2].outcome, Outcome::Submitted { .. }));
    assert!(report.has_failures());
    assert_eq!(sender.sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn reverted_conversion_is_a_confirm_failure_with_hash() {
    let table = prices(1.0, 0.001);
    let evaluator = Evaluator::new(Threshold::new(100.0, 0.0), gating_min(), 1e-6);
    let source = portal("USDC", 1);
    let reader = FakeReader::new(
        &[(source.source_address, Ok(U256::from(200_000_000u64)))],
        &[gating_min()],
    );
    let sender = Arc::new(FakeSender { revert: true, ..Default::default() });
    let ex = executor(sender.clone(), contract("Converter.json", 0xcc));

    let wf = ConvertWorkflow {
        reader: &reader,
        executor: &ex,
        evaluator,
        prices: &table,
        account: account(),
    };
    let report = wf.run(&[source]).await;

    assert!(matches!(
        report.candidates[0].outcome,
        Outcome::Failed { stage: Stage::Confirm, tx_hash: Some(h), .. }
            if h == H256::from_low_u64_be(1)
    ));
    assert!(report.has_failures());
}

#[tokio::test]
async fn gating_balance_is_reread_after_each_conversion() {
    let table = prices(1.0, 0.001);
    let evaluator = Evaluator::new(Threshold::new(100.0, 0.0), gating_min(), 1e-6);
    let a = portal("A", 1);
    let b = portal("B", 2);
    let reader = FakeReader::new(
        &[
            (a.source_address, Ok(U256::from(200_000_000u64))),
            (b.source_address, Ok(U256::from(200_000_000u64))),
        ],
        &[gating_min(), U256::zero()],
    );
    let sender = Arc::new(FakeSender::default());
    let ex = executor(sender.clone(), contract("Converter.json", 0xcc));

    let wf = ConvertWorkflow {
        reader: &reader,
        executor: &ex,
        evaluator,
        prices: &table,
        account: account(),
    };
    let report = wf.run(&[a, b]).await;

    assert!(matches!(report.candidates[0].outcome, Outcome::Submitted { .. }));
    assert_eq!(report.candidates[1].outcome, Outcome::Skipped(SkipReason::GatingBalance));
}

#[tokio::test]
async fn legacy_source_without_quote_is_priced_at_one_dollar() {
    let table = PriceTable::default();
    let evaluator = Evaluator::new(Threshold::new(100.0, 0.0), gating_min(), 1e-6);
    let legacy = RewardSource { kind: RewardKind::Legacy, ..portal("USDCE V1", 0xcc) };
    let reward = U256::from(150_000_000u64);
    let reader = FakeReader::new(&[(legacy.source_address, Ok(reward))], &[gating_min()]);
    let sender = Arc::new(FakeSender::default());
    let ex = executor(sender.clone(), contract("Converter.json", 0xcc));

    let wf = ConvertWorkflow {
        reader: &reader,
        executor: &ex,
        evaluator,
        prices: &table,
        account: account(),
    };
    let report = wf.run(&[legacy]).await;

    assert!(matches!(report.candidates[0].outcome, Outcome::Submitted { .. }));
    // V1_convertUSDCE(address, uint256)
    assert_eq!(sender.sent.lock().unwrap()[0].len(), 4 + 32 * 2);
}

struct FakeRegistry {
    executable: Vec<bool>,
}

#[async_trait]
impl OrderRegistry for FakeRegistry {
    async fn order_count(&self) -> Result<u64> {
        Ok(self.executable.len() as u64)
    }

    async fn can_execute(&self, order_id: u64) -> Result<bool> {
        Ok(self.executable[order_id as usize])
    }
}

#[tokio::test]
async fn only_executable_order_is_submitted() {
    let registry = FakeRegistry { executable: vec![false, false, true, false, false] };
    let sender = Arc::new(FakeSender::default());
    let ex = executor(sender.clone(), contract("Arbitrage.json", 0x4f));

    let report = ArbitrageWorkflow { registry: &registry, executor: &ex }.run().await.unwrap();

    assert_eq!(report.candidates.len(), 5);
    assert_eq!(report.submitted().count(), 1);
    assert_eq!(report.submitted().next().unwrap().label, "order 2");

    let sent = sender.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    // executeArbitrage(address receiver, uint256 orderId): order id is the last word.
    assert_eq!(U256::from_big_endian(&sent[0][36..68]), U256::from(2u64));
    for i in [0, 1, 3, 4] {
        assert_eq!(report.candidates[i].outcome, Outcome::Skipped(SkipReason::NotExecutable));
    }
}

struct DeadRegistry;

#[async_trait]
impl OrderRegistry for DeadRegistry {
    async fn order_count(&self) -> Result<u64> {
        Err(anyhow!("connection refused"))
    }

    async fn can_execute(&self, _order_id: u64) -> Result<bool> {
        unreachable!()
    }
}

#[tokio::test]
async fn unreadable_order_index_aborts_run() {
    let sender = Arc::new(FakeSender::default());
    let ex = executor(sender, contract("Arbitrage.json", 0x4f));
    assert!(ArbitrageWorkflow { registry: &DeadRegistry, executor: &ex }.run().await.is_err());
}
