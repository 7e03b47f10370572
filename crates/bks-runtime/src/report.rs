//! Per-stage outcomes and the run summary.

use bks_config::Stage;
use bks_reconcile::SyncReport;
use bks_schemas::SessionError;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageOutcome {
    /// Records were written; per-record failures are inside the report.
    Synced(SyncReport),
    /// The summary document was overwritten.
    Published,
    /// Nothing was written for this stage.
    Aborted(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    /// Canonical records produced before writing (positions, trades).
    pub records: usize,
    pub outcome: StageOutcome,
}

impl StageReport {
    pub(crate) fn aborted(stage: Stage, records: usize, reason: impl Into<String>) -> Self {
        Self {
            stage,
            records,
            outcome: StageOutcome::Aborted(reason.into()),
        }
    }

    /// An aborted stage counts as one failure; a synced stage as its failed records.
    pub fn failures(&self) -> usize {
        match &self.outcome {
            StageOutcome::Synced(report) => report.failed,
            StageOutcome::Published => 0,
            StageOutcome::Aborted(_) => 1,
        }
    }

    pub fn sync_report(&self) -> Option<&SyncReport> {
        match &self.outcome {
            StageOutcome::Synced(report) => Some(report),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub account: String,
    pub session: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stages: Vec<StageReport>,
}

impl RunSummary {
    pub fn failures(&self) -> usize {
        self.stages.iter().map(StageReport::failures).sum()
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "completed with {} failures", self.failures())
    }
}

/// The only failure that stops a run before any stage executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    Connect(SessionError),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::Connect(e) => write!(f, "session connect failed: {e}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::Connect(e) => Some(e),
        }
    }
}
