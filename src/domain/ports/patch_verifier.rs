//! Patch verifier port.
//!
//! Applying a patch and running its test commands belongs to a collaborator;
//! the engine only consumes the facts it reports.

use async_trait::async_trait;

use crate::domain::models::{FailureReport, PatchProposal};

/// Execution facts for one proposed patch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationOutcome {
    /// The collaborator attempted to apply the patch.
    pub attempted: bool,
    /// The patch applied cleanly and was kept.
    pub applied: bool,
    /// The test commands passed.
    pub tests_passed: bool,
    /// Output of a failed apply, used to recognise stale-context failures.
    pub apply_stderr: Option<String>,
    /// Apply and test output lines.
    pub logs: Vec<String>,
}

/// Applies a patch and runs its test commands on the engine's behalf.
#[async_trait]
pub trait PatchVerifier: Send + Sync {
    /// Verifier name as it appears in logs.
    fn name(&self) -> &'static str;

    /// Apply `patch`, run its test commands, and roll back if they fail.
    async fn verify(&self, patch: &PatchProposal, report: &FailureReport) -> VerificationOutcome;
}
