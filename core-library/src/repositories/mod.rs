//! # Repository Pattern Implementation
//!
//! Repository traits and their SQLite implementations. Together they form the
//! local store the reconciliation engine reads from and writes to.
//!
//! - Traits define the interface for each record kind
//! - SQLite implementations use sqlx for async database access
//! - Every write is a single `INSERT ... ON CONFLICT` or `DELETE` statement
//!
//! ## Available Repositories
//!
//! - `SourceRepository` - installed content sources
//! - `EntryRepository` - item detail fetched from content providers
//! - `LibraryItemRepository` - saved library items
//! - `HistoryRepository` - per-chapter reading progress

pub mod entry;
pub mod history;
pub mod library;
pub mod source;

pub use entry::{EntryRepository, SqliteEntryRepository};
pub use history::{HistoryRepository, SqliteHistoryRepository};
pub use library::{LibraryItemRepository, SqliteLibraryItemRepository};
pub use source::{SourceRepository, SqliteSourceRepository};
