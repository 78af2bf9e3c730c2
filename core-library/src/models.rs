//! Domain models for the reading library
//!
//! Records mirrored between the device store and the remote service, plus the
//! hydrated item detail that only lives locally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

// =============================================================================
// ID Types
// =============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifier of a content source (e.g. `en.mangadex`).
    SourceId
);

string_id!(
    /// Identifier of an item within its source.
    EntityId
);

string_id!(
    /// Stable cross-device identity of one logical item.
    ///
    /// Always issued by the remote service, never generated locally.
    CanonicalId
);

/// Chapter numbers are matched at one decimal place.
pub fn chapter_key(chapter_number: f64) -> i64 {
    (chapter_number * 10.0).round() as i64
}

// =============================================================================
// Domain Models
// =============================================================================

/// The kinds of records that are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Source,
    LibraryItem,
    History,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Source => "source",
            EntityKind::LibraryItem => "library",
            EntityKind::History => "history",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An installed content source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Source {
    pub source_id: SourceId,
    pub name: String,
    pub lang: String,
    /// Repository the source was installed from. `None` for side-loaded
    /// sources, which cannot be reinstalled on another device.
    pub origin_url: Option<String>,
}

impl Source {
    pub fn new(source_id: impl Into<SourceId>, name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            name: name.into(),
            lang: lang.into(),
            origin_url: None,
        }
    }

    pub fn with_origin_url(mut self, url: impl Into<String>) -> Self {
        self.origin_url = Some(url.into());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.source_id.as_str().trim().is_empty() {
            return Err("Source id cannot be empty".to_string());
        }
        if self.name.trim().is_empty() {
            return Err("Source name cannot be empty".to_string());
        }
        Ok(())
    }
}

/// An item saved to the user's library.
///
/// Every timestamp except `date_added` may be `None`, meaning "never observed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LibraryItem {
    /// Resolved lazily; `None` until the first successful upload or download
    pub canonical_id: Option<CanonicalId>,
    pub source_id: SourceId,
    pub entity_id: EntityId,
    pub date_added: DateTime<Utc>,
    pub last_opened: Option<DateTime<Utc>>,
    pub last_read: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl LibraryItem {
    pub fn new(
        source_id: impl Into<SourceId>,
        entity_id: impl Into<EntityId>,
        date_added: DateTime<Utc>,
    ) -> Self {
        Self {
            canonical_id: None,
            source_id: source_id.into(),
            entity_id: entity_id.into(),
            date_added,
            last_opened: None,
            last_read: None,
            last_updated: None,
        }
    }

    pub fn with_canonical_id(mut self, canonical_id: impl Into<CanonicalId>) -> Self {
        self.canonical_id = Some(canonical_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.source_id.as_str().is_empty() || self.entity_id.as_str().is_empty() {
            return Err("Library item needs both source id and entity id".to_string());
        }
        Ok(())
    }
}

/// Reading progress for one chapter of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct HistoryEntry {
    pub canonical_id: Option<CanonicalId>,
    pub source_id: SourceId,
    pub entity_id: EntityId,
    pub chapter_number: f64,
    pub chapter_title: Option<String>,
    pub page_number: i64,
    pub total_pages: i64,
    pub completed: bool,
    pub last_read_at: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        source_id: impl Into<SourceId>,
        entity_id: impl Into<EntityId>,
        chapter_number: f64,
        last_read_at: DateTime<Utc>,
    ) -> Self {
        Self {
            canonical_id: None,
            source_id: source_id.into(),
            entity_id: entity_id.into(),
            chapter_number,
            chapter_title: None,
            page_number: 0,
            total_pages: 0,
            completed: false,
            last_read_at,
        }
    }

    pub fn chapter_key(&self) -> i64 {
        chapter_key(self.chapter_number)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.chapter_number.is_finite() || self.chapter_number < 0.0 {
            return Err(format!("Invalid chapter number {}", self.chapter_number));
        }
        if self.page_number < 0 || self.total_pages < 0 {
            return Err("Page counts cannot be negative".to_string());
        }
        if self.total_pages > 0 && self.page_number > self.total_pages {
            return Err(format!(
                "Page {} is past the end of a {}-page chapter",
                self.page_number, self.total_pages
            ));
        }
        Ok(())
    }
}

/// Full item metadata fetched from a content provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct EntryDetail {
    pub source_id: SourceId,
    pub entity_id: EntityId,
    pub title: String,
    pub author: Option<String>,
    pub cover_url: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
}

impl EntryDetail {
    pub fn new(
        source_id: impl Into<SourceId>,
        entity_id: impl Into<EntityId>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            entity_id: entity_id.into(),
            title: title.into(),
            author: None,
            cover_url: None,
            description: None,
            url: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Entry title cannot be empty".to_string());
        }
        Ok(())
    }
}
