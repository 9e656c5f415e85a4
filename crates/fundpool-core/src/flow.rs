use crate::error::FundPoolError;
use serde::{Deserialize, Serialize};

/// Stages of one submission attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStage {
    #[default]
    Idle,
    Validating,
    Uploading,
    Submitting,
    Succeeded,
    Failed,
}

impl SubmissionStage {
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Uploading => "uploading",
            Self::Submitting => "submitting",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Validating | Self::Uploading | Self::Submitting)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for SubmissionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Enforces `idle -> validating -> uploading -> submitting -> {succeeded, failed} -> idle`.
#[derive(Debug, Clone)]
pub struct SubmissionStageMachine {
    stage: SubmissionStage,
    history: Vec<SubmissionStage>,
}

impl Default for SubmissionStageMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SubmissionStageMachine {
    pub fn new() -> Self {
        Self {
            stage: SubmissionStage::Idle,
            history: vec![SubmissionStage::Idle],
        }
    }

    pub fn stage(&self) -> SubmissionStage {
        self.stage
    }

    /// Stage path since the last attempt began, starting at `idle`.
    pub fn history(&self) -> &[SubmissionStage] {
        &self.history
    }

    pub fn advance(&mut self, next: SubmissionStage) -> Result<(), FundPoolError> {
        if !Self::is_allowed(self.stage, next) {
            return Err(FundPoolError::stage_violation(
                self.stage.name(),
                next.name(),
            ));
        }
        if self.stage == SubmissionStage::Idle {
            self.history.clear();
            self.history.push(SubmissionStage::Idle);
        }
        self.stage = next;
        self.history.push(next);
        Ok(())
    }

    /// Return to `idle` from wherever an interrupted attempt stopped; a no-op when idle.
    ///
    /// The history keeps the stages reached, followed by `idle`.
    pub fn abandon(&mut self) -> bool {
        if self.stage == SubmissionStage::Idle {
            return false;
        }
        self.stage = SubmissionStage::Idle;
        self.history.push(SubmissionStage::Idle);
        true
    }

    fn is_allowed(from: SubmissionStage, to: SubmissionStage) -> bool {
        use SubmissionStage::*;
        matches!(
            (from, to),
            (Idle, Validating)
                | (Validating, Uploading)
                | (Validating, Failed)
                | (Uploading, Submitting)
                | (Uploading, Failed)
                | (Submitting, Succeeded)
                | (Submitting, Failed)
                | (Succeeded, Idle)
                | (Failed, Idle)
        )
    }
}
