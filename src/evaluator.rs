//! Profitability rules.
//!
//! A candidate is eligible when the USD worth of its pending reward reaches
//! the reference price plus the operator's margin, and the account holds the
//! minimum gating balance. Both bounds are inclusive. Worth is floating
//! point; the threshold comparison tolerates `epsilon` USD so that values
//! equal up to float noise compare as equal.

use ethers_core::types::U256;

use crate::scanner::to_units;

/// USD worth of `raw` token units at `price` USD per whole token.
pub fn worth_usd(raw: U256, decimals: u32, price: f64) -> f64 {
    to_units(raw, decimals) * price
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub reference_price: f64,
    pub margin: f64,
}

impl Threshold {
    pub fn new(reference_price: f64, margin: f64) -> Self {
        Self { reference_price, margin }
    }

    pub fn value(&self) -> f64 {
        self.reference_price + self.margin
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluator {
    pub threshold: Threshold,
    pub min_gating_balance: U256,
    pub epsilon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfitabilityDecision {
    pub worth: f64,
    pub threshold: f64,
    /// Worth minus the reference price, i.e. what the conversion nets.
    pub profit: f64,
    pub profitable: bool,
    pub gating_ok: bool,
    pub eligible: bool,
}

impl Evaluator {
    pub fn new(threshold: Threshold, min_gating_balance: U256, epsilon: f64) -> Self {
        Self { threshold, min_gating_balance, epsilon }
    }

    pub fn gating_ok(&self, balance: U256) -> bool {
        balance >= self.min_gating_balance
    }

    pub fn profitable(&self, worth: f64) -> bool {
        worth >= self.threshold.value() - self.epsilon
    }

    pub fn evaluate(&self, worth: f64, gating_balance: U256) -> ProfitabilityDecision {
        let profitable = self.profitable(worth);
        let gating_ok = self.gating_ok(gating_balance);
        ProfitabilityDecision {
            worth,
            threshold: self.threshold.value(),
            profit: worth - self.threshold.reference_price,
            profitable,
            gating_ok,
            eligible: profitable && gating_ok,
        }
    }
}
