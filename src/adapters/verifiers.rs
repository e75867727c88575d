//! Patch verifiers.
//!
//! The engine never applies patches itself. [`ProposalOnlyVerifier`] is what
//! the CLI uses: nothing is applied, so a repair run can at best end with a
//! proposal for human review. [`ScriptedVerifier`] replays preset outcomes for
//! embedding callers that apply patches out of band, and for tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

use crate::domain::models::{FailureReport, PatchProposal};
use crate::domain::ports::{PatchVerifier, VerificationOutcome};

/// Applies nothing; every run ends with a proposal for human review.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProposalOnlyVerifier;

#[async_trait]
impl PatchVerifier for ProposalOnlyVerifier {
    fn name(&self) -> &'static str {
        "proposal_only"
    }

    async fn verify(&self, _patch: &PatchProposal, _report: &FailureReport) -> VerificationOutcome {
        VerificationOutcome {
            logs: vec!["proposal only: patch was not applied".to_string()],
            ..VerificationOutcome::default()
        }
    }
}

/// Serves queued outcomes in order; repeats the last one when exhausted.
#[derive(Debug, Default)]
pub struct ScriptedVerifier {
    outcomes: Mutex<VecDeque<VerificationOutcome>>,
    last: Mutex<Option<VerificationOutcome>>,
    seen: Mutex<Vec<FailureReport>>,
}

impl ScriptedVerifier {
    /// Queue outcomes in serve order.
    pub fn new(outcomes: impl IntoIterator<Item = VerificationOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Applies cleanly and tests pass.
    pub fn passing() -> Self {
        Self::new([VerificationOutcome {
            attempted: true,
            applied: true,
            tests_passed: true,
            apply_stderr: None,
            logs: vec!["applied; tests passed".to_string()],
        }])
    }

    /// Apply fails with `stderr`.
    pub fn apply_fails(stderr: impl Into<String>) -> Self {
        Self::new([VerificationOutcome {
            attempted: true,
            applied: false,
            tests_passed: false,
            apply_stderr: Some(stderr.into()),
            logs: vec!["apply failed".to_string()],
        }])
    }

    /// Reports passed to `verify`, in call order.
    pub async fn seen_reports(&self) -> Vec<FailureReport> {
        self.seen.lock().await.clone()
    }
}

#[async_trait]
impl PatchVerifier for ScriptedVerifier {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn verify(&self, _patch: &PatchProposal, report: &FailureReport) -> VerificationOutcome {
        self.seen.lock().await.push(report.clone());
        let next = self.outcomes.lock().await.pop_front();
        let mut last = self.last.lock().await;
        match next {
            Some(outcome) => {
                *last = Some(outcome.clone());
                outcome
            }
            None => last.clone().unwrap_or_default(),
        }
    }
}
