//! # Sync Reports
//!
//! [`SyncReport`] is the outcome of one phase; [`SyncRunReport`] is the outcome
//! of a whole run and what [`SyncOrchestrator::run`](crate::SyncOrchestrator::run)
//! returns. Failures and skips are kept item by item with their cause so a host
//! can show what did not make it across.

use crate::error::SyncError;
use crate::run::{RunStatus, SyncRunId};
use chrono::{DateTime, Utc};
use core_auth::UserId;
use core_library::EntityKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an item failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    IdentityResolution,
    RemoteUnavailable,
    InvalidResponse,
    LocalStore,
    Other,
}

impl From<&SyncError> for FailureCause {
    fn from(err: &SyncError) -> Self {
        match err {
            SyncError::IdentityResolutionFailed { .. } => FailureCause::IdentityResolution,
            SyncError::RemoteUnavailable(_) => FailureCause::RemoteUnavailable,
            SyncError::InvalidResponse(_) => FailureCause::InvalidResponse,
            SyncError::Library(_) => FailureCause::LocalStore,
            _ => FailureCause::Other,
        }
    }
}

/// Why a remote-only item was not written locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The owning source is not installed on this device
    PrerequisiteMissing,
    /// The content provider could not supply the item detail
    HydrationFailed,
    /// The record carries too little to be recreated locally
    NotRestorable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::PrerequisiteMissing => "prerequisite_missing",
            SkipReason::HydrationFailed => "hydration_failed",
            SkipReason::NotRestorable => "not_restorable",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Identity key of the item, or `snapshot` when a listing failed
    pub key: String,
    pub cause: FailureCause,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSkip {
    pub key: String,
    pub reason: SkipReason,
}

/// Outcome of reconciling one entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub kind: EntityKind,
    /// Local-only items pushed to the remote
    pub uploaded: usize,
    /// Remote-only items written locally
    pub downloaded: usize,
    /// Items on both sides that needed a write on at least one side
    pub merged: usize,
    /// Items on both sides that were already identical
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
    pub local_writes: usize,
    pub remote_writes: usize,
    pub failures: Vec<ItemFailure>,
    pub skips: Vec<ItemSkip>,
}

impl SyncReport {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            uploaded: 0,
            downloaded: 0,
            merged: 0,
            unchanged: 0,
            skipped: 0,
            failed: 0,
            local_writes: 0,
            remote_writes: 0,
            failures: Vec::new(),
            skips: Vec::new(),
        }
    }

    pub fn record_failure(&mut self, key: impl Into<String>, err: &SyncError) {
        self.failed += 1;
        self.failures.push(ItemFailure {
            key: key.into(),
            cause: FailureCause::from(err),
            message: err.to_string(),
        });
    }

    pub fn record_skip(&mut self, key: impl Into<String>, reason: SkipReason) {
        self.skipped += 1;
        self.skips.push(ItemSkip {
            key: key.into(),
            reason,
        });
    }

    /// Total writes on either side.
    pub fn writes(&self) -> usize {
        self.local_writes + self.remote_writes
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Why a run ended early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    AuthRequired,
    Cancelled,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::AuthRequired => f.write_str("auth_required"),
            AbortReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Outcome of a whole sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRunReport {
    pub run_id: SyncRunId,
    pub user_id: Option<UserId>,
    pub status: RunStatus,
    pub abort_reason: Option<AbortReason>,
    /// Completed phases in execution order
    pub phases: Vec<SyncReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncRunReport {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn phase(&self, kind: EntityKind) -> Option<&SyncReport> {
        self.phases.iter().find(|p| p.kind == kind)
    }

    pub fn total_failed(&self) -> usize {
        self.phases.iter().map(|p| p.failed).sum()
    }

    pub fn total_local_writes(&self) -> usize {
        self.phases.iter().map(|p| p.local_writes).sum()
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }
}
