use ethers_core::types::H256;
use std::fmt;

/// Where in a candidate's pipeline a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Read,
    Broadcast,
    Confirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotProfitable,
    GatingBalance,
    NotExecutable,
    DryRun,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Submitted { tx_hash: H256, block: Option<u64> },
    Skipped(SkipReason),
    Failed { stage: Stage, tx_hash: Option<H256>, error: String },
}

impl Outcome {
    pub fn failed(stage: Stage, tx_hash: Option<H256>, error: &anyhow::Error) -> Self {
        Outcome::Failed { stage, tx_hash, error: format!("{error:#}") }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateReport {
    pub label: String,
    pub outcome: Outcome,
}

/// Every candidate a run looked at, in scan order.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub workflow: &'static str,
    pub candidates: Vec<CandidateReport>,
}

impl RunReport {
    pub fn new(workflow: &'static str) -> Self {
        Self { workflow, candidates: Vec::new() }
    }

    pub fn record(&mut self, label: impl Into<String>, outcome: Outcome) {
        self.candidates.push(CandidateReport { label: label.into(), outcome });
    }

    pub fn submitted(&self) -> impl Iterator<Item = &CandidateReport> {
        self.candidates.iter().filter(|c| matches!(c.outcome, Outcome::Submitted { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = &CandidateReport> {
        self.candidates.iter().filter(|c| matches!(c.outcome, Outcome::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    /// Emit one summary event plus one event per failure.
    pub fn log_summary(&self) {
        let submitted = self.submitted().count();
        let failed = self.failures().count();
        let skipped = self.candidates.len() - submitted - failed;
        tracing::info!(
            workflow = self.workflow,
            candidates = self.candidates.len(),
            submitted,
            skipped,
            failed,
            "run finished"
        );
        for c in self.failures() {
            if let Outcome::Failed { stage, tx_hash, error } = &c.outcome {
                tracing::warn!(label = %c.label, ?stage, ?tx_hash, %error, "candidate failed");
            }
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} report:", self.workflow)?;
        for c in &self.candidates {
            match &c.outcome {
                Outcome::Submitted { tx_hash, block } => {
                    let block = block.map_or("-".to_string(), |b| b.to_string());
                    writeln!(f, "  {:<12} submitted {tx_hash:?} (block {block})", c.label)?
                }
                Outcome::Skipped(reason) => writeln!(f, "  {:<12} skipped: {reason:?}", c.label)?,
                Outcome::Failed { stage, error, .. } => {
                    writeln!(f, "  {:<12} FAILED at {stage:?}: {error}", c.label)?
                }
            }
        }
        Ok(())
    }
}
