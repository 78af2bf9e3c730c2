//! # Sync Module
//!
//! Reconciles the device-resident library with the multi-device remote store.
//!
//! ## Overview
//!
//! Local and remote hold the same logical records (installed sources, library
//! items, reading history), each mutated independently while offline. A sync
//! run merges the two into one consistent view without a central lock and
//! without losing data: missing records are copied across, records on both
//! sides are merged field by field.
//!
//! ## Components
//!
//! - **Identity Resolver** (`identity`): maps `(source_id, entity_id, title)` to the shared canonical id
//! - **Metadata Hydrator** (`hydrator`): fetches item detail before a remote-only record is written locally
//! - **Entity Syncer** (`syncer`): generic three-way diff and merge for one record kind
//! - **Sync Orchestrator** (`orchestrator`): ordered phases, per-user lock, cancellation, events
//! - **Run State Machine** (`run`): `Idle → Running → Completed | Aborted`
//! - **Deletion Service** (`deletion`): user-initiated deletes propagated to the remote
//! - **Remote Seams** (`remote`): `RemoteService` and `ContentProvider` traits

pub mod config;
pub mod context;
pub mod deletion;
pub mod entity;
pub mod error;
pub mod hydrator;
pub mod identity;
pub mod orchestrator;
pub mod remote;
pub mod report;
pub mod run;
pub mod syncer;

pub use config::SyncConfig;
pub use context::{LocalStores, SyncContext};
pub use deletion::DeletionService;
pub use entity::{HistoryKey, Restore, SyncEntity};
pub use error::{Result, SyncError};
pub use hydrator::MetadataHydrator;
pub use identity::IdentityResolver;
pub use orchestrator::SyncOrchestrator;
pub use remote::{ContentProvider, ContentProviderRegistry, RemoteService};
pub use report::{
    AbortReason, FailureCause, ItemFailure, ItemSkip, SkipReason, SyncReport, SyncRunReport,
};
pub use run::{RunStatus, SyncPhase, SyncRun, SyncRunId};
pub use syncer::{EntitySyncer, SNAPSHOT_FAILURE_KEY};
