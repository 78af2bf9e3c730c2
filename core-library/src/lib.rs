//! # Library Management Module
//!
//! Owns the device-resident reading library.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite schema, migrations and connection pooling ([`db`])
//! - Domain records shared with the remote service ([`models`])
//! - Field-level merge rules used during reconciliation ([`merge`])
//! - Repository traits and SQLite implementations ([`repositories`])

pub mod db;
pub mod error;
pub mod merge;
pub mod models;
pub mod repositories;

pub use error::{LibraryError, Result};
pub use merge::FieldMerge;
pub use models::{
    CanonicalId, EntityId, EntityKind, EntryDetail, HistoryEntry, LibraryItem, Source, SourceId,
};
