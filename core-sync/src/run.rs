//! # Sync Run State Machine
//!
//! ```text
//! Idle → Running → Completed
//!   ↓        ↓
//!   └─────→ Aborted
//! ```
//!
//! While `Running`, the run moves through its phases strictly in order:
//! `SourceSync → LibrarySync → HistorySync`. A phase may be entered only once
//! and only after the one before it.

use crate::error::{Result, SyncError};
use crate::report::{AbortReason, SyncReport, SyncRunReport};
use chrono::{DateTime, Utc};
use core_auth::UserId;
use core_library::EntityKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncRunId(Uuid);

impl SyncRunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SyncRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Aborted,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Aborted => "aborted",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered sub-phases of a running sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SyncPhase {
    SourceSync,
    LibrarySync,
    HistorySync,
}

impl SyncPhase {
    /// All phases in execution order.
    pub const ALL: [SyncPhase; 3] = [
        SyncPhase::SourceSync,
        SyncPhase::LibrarySync,
        SyncPhase::HistorySync,
    ];

    pub fn kind(&self) -> EntityKind {
        match self {
            SyncPhase::SourceSync => EntityKind::Source,
            SyncPhase::LibrarySync => EntityKind::LibraryItem,
            SyncPhase::HistorySync => EntityKind::History,
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncPhase::SourceSync => "source_sync",
            SyncPhase::LibrarySync => "library_sync",
            SyncPhase::HistorySync => "history_sync",
        };
        f.write_str(s)
    }
}

/// One sync run for one user.
#[derive(Debug, Clone)]
pub struct SyncRun {
    pub id: SyncRunId,
    pub user_id: Option<UserId>,
    pub status: RunStatus,
    current_phase: Option<SyncPhase>,
    phases: Vec<SyncReport>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
}

impl SyncRun {
    pub fn new(user_id: Option<UserId>) -> Self {
        Self {
            id: SyncRunId::new(),
            user_id,
            status: RunStatus::Idle,
            current_phase: None,
            phases: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
        }
    }

    /// # Errors
    ///
    /// Returns an error unless the run is `Idle`
    pub fn start(mut self) -> Result<Self> {
        self.validate_transition(RunStatus::Running)?;
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(self)
    }

    pub fn current_phase(&self) -> Option<SyncPhase> {
        self.current_phase
    }

    /// The phase after the current one, if any remain.
    pub fn next_phase(&self) -> Option<SyncPhase> {
        match self.current_phase {
            None => Some(SyncPhase::SourceSync),
            Some(SyncPhase::SourceSync) => Some(SyncPhase::LibrarySync),
            Some(SyncPhase::LibrarySync) => Some(SyncPhase::HistorySync),
            Some(SyncPhase::HistorySync) => None,
        }
    }

    /// Enter `phase`.
    ///
    /// # Errors
    ///
    /// Returns an error if the run is not running or `phase` is not the next one
    pub fn begin_phase(&mut self, phase: SyncPhase) -> Result<()> {
        if self.status != RunStatus::Running {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.to_string(),
                to: phase.to_string(),
                reason: "Run must be running to enter a phase".to_string(),
            });
        }

        if self.next_phase() != Some(phase) {
            return Err(SyncError::InvalidStateTransition {
                from: self
                    .current_phase
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| self.status.to_string()),
                to: phase.to_string(),
                reason: "Phases run strictly in order".to_string(),
            });
        }

        self.current_phase = Some(phase);
        Ok(())
    }

    /// Record the report of the current phase.
    pub fn record_phase(&mut self, report: SyncReport) {
        self.phases.push(report);
    }

    pub fn phases(&self) -> &[SyncReport] {
        &self.phases
    }

    /// # Errors
    ///
    /// Returns an error unless the run is `Running`
    pub fn complete(mut self) -> Result<SyncRunReport> {
        self.validate_transition(RunStatus::Completed)?;
        self.status = RunStatus::Completed;
        Ok(self.into_report(None))
    }

    /// End the run early.
    ///
    /// An auth abort discards the phase reports: nothing partial is recorded.
    /// A cancellation keeps the phases that finished before it.
    ///
    /// # Errors
    ///
    /// Returns an error if the run already ended
    pub fn abort(mut self, reason: AbortReason) -> Result<SyncRunReport> {
        self.validate_transition(RunStatus::Aborted)?;
        self.status = RunStatus::Aborted;
        if reason == AbortReason::AuthRequired {
            self.phases.clear();
        }
        Ok(self.into_report(Some(reason)))
    }

    fn into_report(self, abort_reason: Option<AbortReason>) -> SyncRunReport {
        SyncRunReport {
            run_id: self.id,
            user_id: self.user_id,
            status: self.status,
            abort_reason,
            phases: self.phases,
            started_at: self.started_at.unwrap_or(self.created_at),
            finished_at: Utc::now(),
        }
    }

    fn validate_transition(&self, to: RunStatus) -> Result<()> {
        let valid = matches!(
            (self.status, to),
            (RunStatus::Idle, RunStatus::Running)
                | (RunStatus::Idle, RunStatus::Aborted)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Aborted)
        );

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.to_string(),
                to: to.to_string(),
                reason: format!("Cannot transition from {} to {}", self.status, to),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running() -> SyncRun {
        SyncRun::new(Some(UserId::new("u1"))).start().unwrap()
    }

    #[test]
    fn test_full_lifecycle() {
        let mut run = running();
        for phase in SyncPhase::ALL {
            run.begin_phase(phase).unwrap();
            run.record_phase(SyncReport::new(phase.kind()));
        }
        assert_eq!(run.next_phase(), None);

        let report = run.complete().unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.phases.len(), 3);
        assert_eq!(report.phases[1].kind, EntityKind::LibraryItem);
        assert!(report.abort_reason.is_none());
    }

    #[test]
    fn test_phases_must_run_in_order() {
        let mut run = running();
        let skipped = run.begin_phase(SyncPhase::LibrarySync);
        assert!(matches!(
            skipped,
            Err(SyncError::InvalidStateTransition { .. })
        ));

        run.begin_phase(SyncPhase::SourceSync).unwrap();
        assert!(run.begin_phase(SyncPhase::SourceSync).is_err());
    }

    #[test]
    fn test_phase_requires_running() {
        let mut idle = SyncRun::new(None);
        assert!(idle.begin_phase(SyncPhase::SourceSync).is_err());
    }

    #[test]
    fn test_auth_abort_discards_phases() {
        let mut run = running();
        run.begin_phase(SyncPhase::SourceSync).unwrap();
        run.record_phase(SyncReport::new(EntityKind::Source));

        let report = run.abort(AbortReason::AuthRequired).unwrap();
        assert_eq!(report.status, RunStatus::Aborted);
        assert!(report.phases.is_empty());
    }

    #[test]
    fn test_cancel_keeps_finished_phases() {
        let mut run = running();
        run.begin_phase(SyncPhase::SourceSync).unwrap();
        run.record_phase(SyncReport::new(EntityKind::Source));

        let report = run.abort(AbortReason::Cancelled).unwrap();
        assert_eq!(report.abort_reason, Some(AbortReason::Cancelled));
        assert_eq!(report.phases.len(), 1);
    }

    #[test]
    fn test_idle_run_can_abort_but_not_complete() {
        assert!(SyncRun::new(None).complete().is_err());
        let report = SyncRun::new(None).abort(AbortReason::AuthRequired).unwrap();
        assert!(report.user_id.is_none());
        assert!(report.phases.is_empty());
    }

    #[test]
    fn test_terminal_status() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Aborted.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert_eq!(SyncPhase::HistorySync.to_string(), "history_sync");
    }
}
