//! # Sync Orchestrator
//!
//! Runs the three reconciliation phases for the signed-in user, strictly in
//! order, because each phase consumes what the previous one materialized:
//!
//! 1. **Sources**: library items and history need their source installed
//! 2. **Library**: resolves the canonical ids that history uploads reuse
//! 3. **History**
//!
//! ## Run outcome
//!
//! - `Completed` once all phases ran, whatever item failures they recorded
//! - `Aborted(AuthRequired)` if the session is missing or lost; no phase is kept
//! - `Aborted(Cancelled)` if [`SyncOrchestrator::cancel`] was called; phases
//!   that finished before the checkpoint are kept
//!
//! At most one run per user is active at a time. A second call while one is
//! running returns [`SyncError::SyncInProgress`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! let orchestrator = SyncOrchestrator::new(remote, stores, providers, auth, SyncConfig::default())
//!     .with_event_bus(event_bus.clone());
//!
//! let report = orchestrator.run().await?;
//! if report.is_completed() {
//!     println!("{} item failures", report.total_failed());
//! }
//! ```

use crate::config::SyncConfig;
use crate::context::{LocalStores, SyncContext};
use crate::error::{Result, SyncError};
use crate::hydrator::MetadataHydrator;
use crate::identity::IdentityResolver;
use crate::remote::{ContentProvider, RemoteService};
use crate::report::{AbortReason, SyncReport, SyncRunReport};
use crate::run::{SyncPhase, SyncRun, SyncRunId};
use crate::syncer::EntitySyncer;
use core_auth::{AuthContext, UserId};
use core_library::{HistoryEntry, LibraryItem, Source};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent, SyncEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{field, info, instrument, warn, Span};

#[derive(Clone)]
struct ActiveRun {
    run_id: SyncRunId,
    cancellation_token: CancellationToken,
}

type ActiveRuns = Arc<Mutex<HashMap<UserId, ActiveRun>>>;

fn lock_runs(runs: &ActiveRuns) -> MutexGuard<'_, HashMap<UserId, ActiveRun>> {
    runs.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases the per-user lock when the run ends, including when the run
/// future is dropped.
struct RunGuard {
    runs: ActiveRuns,
    user_id: UserId,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        lock_runs(&self.runs).remove(&self.user_id);
    }
}

pub struct SyncOrchestrator {
    remote: Arc<dyn RemoteService>,
    stores: LocalStores,
    provider: Arc<dyn ContentProvider>,
    auth: Arc<dyn AuthContext>,
    event_bus: Option<EventBus>,
    config: SyncConfig,
    active_runs: ActiveRuns,
}

impl SyncOrchestrator {
    pub fn new(
        remote: Arc<dyn RemoteService>,
        stores: LocalStores,
        provider: Arc<dyn ContentProvider>,
        auth: Arc<dyn AuthContext>,
        config: SyncConfig,
    ) -> Self {
        Self {
            remote,
            stores,
            provider,
            auth,
            event_bus: None,
            config,
            active_runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run one full sync for the current user.
    ///
    /// # Errors
    ///
    /// [`SyncError::SyncInProgress`] if a run for this user is already active.
    /// Every other outcome, including aborts, is reported in the returned
    /// [`SyncRunReport`].
    #[instrument(skip(self), fields(user_id = field::Empty, run_id = field::Empty))]
    pub async fn run(&self) -> Result<SyncRunReport> {
        let user_id = self.auth.user_id().await;
        let session_valid = self.auth.is_valid().await;
        let user_id = match user_id {
            Some(user_id) if session_valid => user_id,
            user_id => {
                info!("No valid session, sync skipped");
                let run = SyncRun::new(user_id);
                return self.finish_aborted(run, AbortReason::AuthRequired);
            }
        };
        Span::current().record("user_id", field::display(&user_id));

        let run = SyncRun::new(Some(user_id.clone()));
        let cancellation_token = CancellationToken::new();
        let _guard = self.acquire(&user_id, run.id, cancellation_token.clone())?;
        Span::current().record("run_id", field::display(&run.id));

        let ctx = Arc::new(self.build_context(user_id.clone()));
        let mut run = run.start()?;
        self.emit(CoreEvent::Sync(SyncEvent::Started {
            run_id: run.id.to_string(),
            user_id: user_id.to_string(),
        }));
        info!("Sync run started");

        for phase in SyncPhase::ALL {
            if cancellation_token.is_cancelled() {
                info!(next_phase = %phase, "Sync cancelled at checkpoint");
                return self.finish_aborted(run, AbortReason::Cancelled);
            }
            if !self.auth.is_valid().await {
                warn!(next_phase = %phase, "Session expired between phases");
                return self.finish_aborted(run, AbortReason::AuthRequired);
            }

            run.begin_phase(phase)?;
            let outcome = match phase {
                SyncPhase::SourceSync => EntitySyncer::<Source>::new(Arc::clone(&ctx)).run().await,
                SyncPhase::LibrarySync => {
                    EntitySyncer::<LibraryItem>::new(Arc::clone(&ctx)).run().await
                }
                SyncPhase::HistorySync => {
                    EntitySyncer::<HistoryEntry>::new(Arc::clone(&ctx)).run().await
                }
            };

            match outcome {
                Ok(report) => {
                    self.publish_phase(&run, &report);
                    run.record_phase(report);
                }
                Err(SyncError::AuthRequired) => {
                    warn!(phase = %phase, "Authentication required, aborting run");
                    return self.finish_aborted(run, AbortReason::AuthRequired);
                }
                Err(err) => return Err(err),
            }
        }

        let report = run.complete()?;
        self.emit(CoreEvent::Sync(SyncEvent::Completed {
            run_id: report.run_id.to_string(),
            phases: report.phases.len(),
            failed: report.total_failed(),
            duration_ms: report.duration_ms(),
        }));
        info!(
            failed = report.total_failed(),
            local_writes = report.total_local_writes(),
            duration_ms = report.duration_ms(),
            "Sync run completed"
        );
        Ok(report)
    }

    /// Ask the active run of `user_id` to stop at its next phase checkpoint.
    ///
    /// Returns `false` if no run is active.
    pub fn cancel(&self, user_id: &UserId) -> bool {
        match lock_runs(&self.active_runs).get(user_id) {
            Some(active) => {
                info!(user_id = %user_id, run_id = %active.run_id, "Cancelling sync run");
                active.cancellation_token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, user_id: &UserId) -> bool {
        lock_runs(&self.active_runs).contains_key(user_id)
    }

    fn acquire(
        &self,
        user_id: &UserId,
        run_id: SyncRunId,
        cancellation_token: CancellationToken,
    ) -> Result<RunGuard> {
        let mut runs = lock_runs(&self.active_runs);
        if runs.contains_key(user_id) {
            return Err(SyncError::SyncInProgress {
                user_id: user_id.to_string(),
            });
        }
        runs.insert(
            user_id.clone(),
            ActiveRun {
                run_id,
                cancellation_token,
            },
        );

        Ok(RunGuard {
            runs: Arc::clone(&self.active_runs),
            user_id: user_id.clone(),
        })
    }

    /// Fresh per-run state; the identity cache never outlives a run.
    fn build_context(&self, user_id: UserId) -> SyncContext {
        let identity = IdentityResolver::new(
            Arc::clone(&self.remote),
            Arc::clone(&self.auth),
            self.config.remote_call_timeout,
        );
        let hydrator = MetadataHydrator::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.stores.sources),
            Arc::clone(&self.stores.entries),
            self.config.hydration_timeout,
        );

        SyncContext {
            user_id,
            remote: Arc::clone(&self.remote),
            stores: self.stores.clone(),
            identity: Arc::new(identity),
            hydrator: Arc::new(hydrator),
            config: self.config,
        }
    }

    fn publish_phase(&self, run: &SyncRun, report: &SyncReport) {
        self.emit(CoreEvent::Sync(SyncEvent::PhaseCompleted {
            run_id: run.id.to_string(),
            phase: report.kind.to_string(),
            uploaded: report.uploaded,
            downloaded: report.downloaded,
            merged: report.merged,
            skipped: report.skipped,
            failed: report.failed,
        }));

        if report.local_writes > 0 {
            self.emit(CoreEvent::Library(LibraryEvent::LocalDataChanged {
                kind: report.kind.to_string(),
                count: report.local_writes,
            }));
        }
    }

    fn finish_aborted(&self, run: SyncRun, reason: AbortReason) -> Result<SyncRunReport> {
        let report = run.abort(reason)?;
        self.emit(CoreEvent::Sync(SyncEvent::Aborted {
            run_id: report.run_id.to_string(),
            reason: reason.to_string(),
        }));
        Ok(report)
    }

    fn emit(&self, event: CoreEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(event).ok();
        }
    }
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
