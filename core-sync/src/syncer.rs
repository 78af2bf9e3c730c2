//! # Three-Way Reconciliation
//!
//! [`EntitySyncer`] reconciles one record kind between the local store and
//! the remote service:
//!
//! 1. Snapshot both sides and key every record by its identity.
//! 2. **Upload** local-only records.
//! 3. **Download** remote-only records, if their prerequisites hold.
//! 4. **Merge** records present on both sides field by field, writing only the
//!    side(s) the merged record differs from.
//!
//! Item operations run on a bounded worker pool and may finish in any order.
//! An item failure is recorded in the [`SyncReport`] and never stops the batch;
//! only [`SyncError::AuthRequired`] ends the phase early.

use crate::context::SyncContext;
use crate::entity::{Restore, SyncEntity};
use crate::error::{Result, SyncError};
use crate::report::{SkipReason, SyncReport};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Key recorded when a whole snapshot could not be read.
pub const SNAPSHOT_FAILURE_KEY: &str = "snapshot";

enum Work<T> {
    Upload(T),
    Download(T),
    Merge { local: T, remote: T },
}

enum Outcome {
    Uploaded,
    Downloaded,
    Skipped(SkipReason),
    Merged,
    Unchanged,
}

/// Result of one item operation. Writes that landed before a failure are still counted.
struct Applied {
    local_writes: usize,
    remote_writes: usize,
    result: Result<Outcome>,
}

impl Applied {
    fn done(outcome: Outcome, local_writes: usize, remote_writes: usize) -> Self {
        Self {
            local_writes,
            remote_writes,
            result: Ok(outcome),
        }
    }

    fn failed(err: SyncError, local_writes: usize) -> Self {
        Self {
            local_writes,
            remote_writes: 0,
            result: Err(err),
        }
    }
}

pub struct EntitySyncer<T: SyncEntity> {
    ctx: Arc<SyncContext>,
    _kind: PhantomData<fn() -> T>,
}

impl<T: SyncEntity> EntitySyncer<T> {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self {
            ctx,
            _kind: PhantomData,
        }
    }

    /// Reconcile every record of kind `T`.
    ///
    /// # Errors
    ///
    /// Only [`SyncError::AuthRequired`]; everything else lands in the report.
    #[instrument(skip(self), fields(kind = %T::kind(), user_id = %self.ctx.user_id))]
    pub async fn run(&self) -> Result<SyncReport> {
        let mut report = SyncReport::new(T::kind());

        let (local, remote) = futures::join!(T::list_local(&self.ctx), T::list_remote(&self.ctx));
        let local = match snapshot(local, &mut report)? {
            Some(records) => records,
            None => return Ok(report),
        };
        let remote = match snapshot(remote, &mut report)? {
            Some(records) => records,
            None => return Ok(report),
        };

        debug!(local = local.len(), remote = remote.len(), "Snapshots loaded");

        let local = self.key_local(local, &mut report).await?;
        let mut remote = key_remote(remote, &mut report);

        let mut work = Vec::with_capacity(local.len() + remote.len());
        for (key, local) in local {
            match remote.remove(&key) {
                Some(remote) => work.push((key.to_string(), Work::Merge { local, remote })),
                None => work.push((key.to_string(), Work::Upload(local))),
            }
        }
        for (key, remote) in remote {
            work.push((key.to_string(), Work::Download(remote)));
        }

        self.apply_all(work, &mut report).await?;

        info!(
            uploaded = report.uploaded,
            downloaded = report.downloaded,
            merged = report.merged,
            unchanged = report.unchanged,
            skipped = report.skipped,
            failed = report.failed,
            "Phase reconciled"
        );
        Ok(report)
    }

    /// Key local records, resolving identities concurrently. Duplicate keys
    /// are folded together with the field merge.
    async fn key_local(&self, records: Vec<T>, report: &mut SyncReport) -> Result<HashMap<T::Key, T>> {
        let mut keyed: HashMap<T::Key, T> = HashMap::with_capacity(records.len());

        let mut resolved = stream::iter(records)
            .map(|record| {
                let ctx = Arc::clone(&self.ctx);
                async move {
                    let label = record.local_label();
                    (label, record.resolve_local(&ctx).await)
                }
            })
            .buffer_unordered(self.ctx.config.max_concurrency);

        while let Some((label, result)) = resolved.next().await {
            match result {
                Ok((key, record)) => fold_into(&mut keyed, key, record),
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(key = %label, error = %err, "Identity resolution failed");
                    report.record_failure(label, &err);
                }
            }
        }

        Ok(keyed)
    }

    async fn apply_all(&self, work: Vec<(String, Work<T>)>, report: &mut SyncReport) -> Result<()> {
        let mut applied = stream::iter(work)
            .map(|(key, work)| {
                let ctx = Arc::clone(&self.ctx);
                async move {
                    let applied = apply(work, &ctx).await;
                    (key, applied)
                }
            })
            .buffer_unordered(self.ctx.config.max_concurrency);

        while let Some((key, applied)) = applied.next().await {
            report.local_writes += applied.local_writes;
            report.remote_writes += applied.remote_writes;

            match applied.result {
                Ok(Outcome::Uploaded) => report.uploaded += 1,
                Ok(Outcome::Downloaded) => report.downloaded += 1,
                Ok(Outcome::Merged) => report.merged += 1,
                Ok(Outcome::Unchanged) => report.unchanged += 1,
                Ok(Outcome::Skipped(reason)) => {
                    debug!(key = %key, reason = %reason, "Item skipped");
                    report.record_skip(key, reason);
                }
                Err(err) if err.is_fatal() => {
                    warn!(key = %key, "Authentication lost mid-phase");
                    return Err(err);
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "Item failed");
                    report.record_failure(key, &err);
                }
            }
        }

        Ok(())
    }
}

async fn apply<T: SyncEntity>(work: Work<T>, ctx: &SyncContext) -> Applied {
    match work {
        Work::Upload(local) => match local.push_remote(ctx).await {
            Ok(()) => Applied::done(Outcome::Uploaded, 0, 1),
            Err(err) => Applied::failed(err, 0),
        },
        Work::Download(remote) => match remote.restore_local(ctx).await {
            Ok(Restore::Written) => Applied::done(Outcome::Downloaded, 1, 0),
            Ok(Restore::Skipped(reason)) => Applied::done(Outcome::Skipped(reason), 0, 0),
            Err(err) => Applied::failed(err, 0),
        },
        Work::Merge { local, remote } => {
            let merged = local.merge(&remote);
            let write_local = merged.differs_from(&local);
            let write_remote = merged.differs_from(&remote);

            if write_local {
                if let Err(err) = merged.write_local(ctx).await {
                    return Applied::failed(err, 0);
                }
            }
            if write_remote {
                if let Err(err) = merged.push_remote(ctx).await {
                    return Applied::failed(err, usize::from(write_local));
                }
            }

            if write_local || write_remote {
                Applied::done(
                    Outcome::Merged,
                    usize::from(write_local),
                    usize::from(write_remote),
                )
            } else {
                Applied::done(Outcome::Unchanged, 0, 0)
            }
        }
    }
}

/// `None` when the snapshot failed and was recorded.
fn snapshot<T>(listed: Result<Vec<T>>, report: &mut SyncReport) -> Result<Option<Vec<T>>> {
    match listed {
        Ok(records) => Ok(Some(records)),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            warn!(kind = %report.kind, error = %err, "Snapshot failed, skipping phase");
            report.record_failure(SNAPSHOT_FAILURE_KEY, &err);
            Ok(None)
        }
    }
}

fn key_remote<T: SyncEntity>(records: Vec<T>, report: &mut SyncReport) -> HashMap<T::Key, T> {
    let mut keyed = HashMap::with_capacity(records.len());
    for record in records {
        match record.remote_key() {
            Ok(key) => fold_into(&mut keyed, key, record),
            Err(err) => report.record_failure(record.local_label(), &err),
        }
    }
    keyed
}

fn fold_into<T: SyncEntity>(keyed: &mut HashMap<T::Key, T>, key: T::Key, record: T) {
    let record = match keyed.remove(&key) {
        Some(existing) => existing.merge(&record),
        None => record,
    };
    keyed.insert(key, record);
}
