//! Supabase table rows and RPC payloads
//!
//! Rows are scoped by `user_id`. Library and history rows are keyed by the
//! canonical manga id; `chapter_number` is text with one decimal place.

use chrono::{DateTime, Utc};
use core_auth::{SessionUser, UserId};
use core_library::{HistoryEntry, LibraryItem, Source};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SupabaseError};

/// Row of `scanio_user_sources`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub source_id: String,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub source_lang: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<DateTime<Utc>>,
}

impl SourceRow {
    pub fn from_source(user_id: &UserId, source: &Source) -> Self {
        Self {
            id: None,
            user_id: user_id.to_string(),
            source_id: source.source_id.to_string(),
            source_name: Some(source.name.clone()),
            source_lang: Some(source.lang.clone()),
            source_url: source.origin_url.clone(),
            added_at: None,
        }
    }

    pub fn into_source(self) -> Source {
        Source {
            name: self.source_name.unwrap_or_else(|| self.source_id.clone()),
            lang: self.source_lang.unwrap_or_default(),
            origin_url: self.source_url.filter(|url| !url.is_empty()),
            source_id: self.source_id.into(),
        }
    }
}

/// Row of `scanio_user_library`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryRow {
    #[serde(default)]
    pub id: Option<String>,
    pub user_id: String,
    pub canonical_manga_id: String,
    pub source_id: String,
    pub manga_id: String,
    pub date_added: DateTime<Utc>,
    #[serde(default)]
    pub last_opened: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_read: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl LibraryRow {
    pub fn into_item(self) -> LibraryItem {
        LibraryItem {
            canonical_id: Some(self.canonical_manga_id.into()),
            source_id: self.source_id.into(),
            entity_id: self.manga_id.into(),
            date_added: self.date_added,
            last_opened: self.last_opened,
            last_read: self.last_read,
            last_updated: self.last_updated,
        }
    }
}

/// Parameters of the `scanio_upsert_user_library` RPC
#[derive(Debug, Clone, Serialize)]
pub struct UpsertLibraryParams {
    pub p_user_id: String,
    pub p_canonical_manga_id: String,
    pub p_source_id: String,
    pub p_manga_id: String,
    pub p_date_added: DateTime<Utc>,
    pub p_last_opened: Option<DateTime<Utc>>,
    pub p_last_read: Option<DateTime<Utc>>,
    pub p_last_updated: Option<DateTime<Utc>>,
}

impl UpsertLibraryParams {
    pub fn from_item(user_id: &UserId, item: &LibraryItem) -> Result<Self> {
        let canonical_id = item.canonical_id.as_ref().ok_or_else(|| {
            SupabaseError::ParseError(format!(
                "library item {}/{} has no canonical id",
                item.source_id, item.entity_id
            ))
        })?;

        Ok(Self {
            p_user_id: user_id.to_string(),
            p_canonical_manga_id: canonical_id.to_string(),
            p_source_id: item.source_id.to_string(),
            p_manga_id: item.entity_id.to_string(),
            p_date_added: item.date_added,
            p_last_opened: item.last_opened,
            p_last_read: item.last_read,
            p_last_updated: item.last_updated,
        })
    }
}

/// `chapter_number` as stored: text, though numeric columns come back as numbers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChapterNumber {
    Text(String),
    Number(f64),
}

impl ChapterNumber {
    pub fn format(chapter_number: f64) -> Self {
        ChapterNumber::Text(format!("{:.1}", chapter_number))
    }

    /// The chapter number as a finite `f64`; `NaN` and infinities are rejected.
    pub fn value(&self) -> Result<f64> {
        let invalid = || SupabaseError::ParseError(format!("invalid chapter number '{}'", self));
        let value = match self {
            ChapterNumber::Number(n) => *n,
            ChapterNumber::Text(s) => s.trim().parse().map_err(|_| invalid())?,
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(invalid())
        }
    }
}

impl std::fmt::Display for ChapterNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChapterNumber::Text(s) => f.write_str(s),
            ChapterNumber::Number(n) => write!(f, "{}", n),
        }
    }
}

/// Row of `scanio_reading_history`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub canonical_manga_id: String,
    pub source_id: String,
    pub manga_id: String,
    /// Present on writes; reads only need `chapter_number`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<String>,
    pub chapter_number: ChapterNumber,
    #[serde(default)]
    pub chapter_title: Option<String>,
    #[serde(default)]
    pub page_number: i64,
    #[serde(default)]
    pub total_pages: i64,
    #[serde(default)]
    pub is_completed: bool,
    pub last_read_at: DateTime<Utc>,
}

impl HistoryRow {
    pub fn from_entry(user_id: &UserId, entry: &HistoryEntry) -> Result<Self> {
        let canonical_id = entry.canonical_id.as_ref().ok_or_else(|| {
            SupabaseError::ParseError(format!(
                "history entry {}/{} has no canonical id",
                entry.source_id, entry.entity_id
            ))
        })?;
        let chapter_number = ChapterNumber::format(entry.chapter_number);
        let chapter_id = match &chapter_number {
            ChapterNumber::Text(s) => s.clone(),
            ChapterNumber::Number(n) => n.to_string(),
        };

        Ok(Self {
            id: None,
            user_id: user_id.to_string(),
            canonical_manga_id: canonical_id.to_string(),
            source_id: entry.source_id.to_string(),
            manga_id: entry.entity_id.to_string(),
            chapter_id: Some(chapter_id),
            chapter_number,
            chapter_title: entry.chapter_title.clone(),
            page_number: entry.page_number,
            total_pages: entry.total_pages,
            is_completed: entry.completed,
            last_read_at: entry.last_read_at,
        })
    }

    pub fn into_entry(self) -> Result<HistoryEntry> {
        Ok(HistoryEntry {
            chapter_number: self.chapter_number.value()?,
            canonical_id: Some(self.canonical_manga_id.into()),
            source_id: self.source_id.into(),
            entity_id: self.manga_id.into(),
            chapter_title: self.chapter_title,
            page_number: self.page_number,
            total_pages: self.total_pages,
            completed: self.is_completed,
            last_read_at: self.last_read_at,
        })
    }
}

/// Parameters of the `scanio_get_or_create_canonical_manga` RPC
#[derive(Debug, Clone, Serialize)]
pub struct CanonicalMangaParams {
    pub p_title: String,
    pub p_source_id: String,
    pub p_manga_id: String,
}

/// Body of `POST /auth/v1/token?grant_type=password`
#[derive(Serialize)]
pub struct PasswordGrant<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Body of `POST /auth/v1/token?grant_type=refresh_token`
#[derive(Serialize)]
pub struct RefreshGrant<'a> {
    pub refresh_token: &'a str,
}

/// Token grant returned by the auth endpoints
#[derive(Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub user: SessionUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}
