//! Workspace facade crate.
//!
//! Re-exports the composition root so host applications can depend on
//! `reader-sync-workspace` alone and pick platform shims through features
//! instead of wiring each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service::{CoreDependencies, CoreError, CoreService, Result};
