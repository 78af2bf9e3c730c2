//! Field-level merge rules
//!
//! Each reconciled record type knows how to combine a local and a remote copy
//! of itself. Timestamps are compared at microsecond precision, which is what
//! the remote service stores; this keeps a merged record from looking
//! "different" on every run because of truncated nanoseconds.

use crate::models::{HistoryEntry, LibraryItem, Source};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// Combine two copies of the same logical record.
pub trait FieldMerge: Sized {
    /// Merge `remote` into `self`. Identity fields are taken from `self`.
    fn merge(&self, remote: &Self) -> Self;

    /// Whether the synced fields of the two copies differ.
    fn differs_from(&self, other: &Self) -> bool;
}

/// Later of two instants; `None` is older than any value. Ties keep `local`.
pub fn max_timestamp(
    local: Option<DateTime<Utc>>,
    remote: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match (local, remote) {
        (Some(l), Some(r)) if r.timestamp_micros() > l.timestamp_micros() => Some(r),
        (Some(l), _) => Some(l),
        (None, r) => r,
    }
}

pub fn same_instant(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.timestamp_micros() == b.timestamp_micros()
}

fn same_optional_instant(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => same_instant(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Sources carry no timestamps, so disagreeing fields settle on the greater
/// value. Every device then converges on the same record.
impl FieldMerge for Source {
    fn merge(&self, remote: &Self) -> Self {
        Self {
            source_id: self.source_id.clone(),
            name: self.name.clone().max(remote.name.clone()),
            lang: self.lang.clone().max(remote.lang.clone()),
            origin_url: self.origin_url.clone().max(remote.origin_url.clone()),
        }
    }

    fn differs_from(&self, other: &Self) -> bool {
        self.name != other.name || self.lang != other.lang || self.origin_url != other.origin_url
    }
}

impl FieldMerge for LibraryItem {
    fn merge(&self, remote: &Self) -> Self {
        let date_added = if remote.date_added.timestamp_micros() < self.date_added.timestamp_micros()
        {
            remote.date_added
        } else {
            self.date_added
        };

        Self {
            canonical_id: self.canonical_id.clone().or_else(|| remote.canonical_id.clone()),
            source_id: self.source_id.clone(),
            entity_id: self.entity_id.clone(),
            date_added,
            last_opened: max_timestamp(self.last_opened, remote.last_opened),
            last_read: max_timestamp(self.last_read, remote.last_read),
            last_updated: max_timestamp(self.last_updated, remote.last_updated),
        }
    }

    fn differs_from(&self, other: &Self) -> bool {
        !same_instant(self.date_added, other.date_added)
            || !same_optional_instant(self.last_opened, other.last_opened)
            || !same_optional_instant(self.last_read, other.last_read)
            || !same_optional_instant(self.last_updated, other.last_updated)
    }
}

impl FieldMerge for HistoryEntry {
    fn merge(&self, remote: &Self) -> Self {
        let local_micros = self.last_read_at.timestamp_micros();
        let remote_micros = remote.last_read_at.timestamp_micros();

        let (page_number, total_pages, last_read_at) = if remote_micros > local_micros {
            (remote.page_number, remote.total_pages, remote.last_read_at)
        } else if remote_micros < local_micros {
            (self.page_number, self.total_pages, self.last_read_at)
        } else {
            (
                self.page_number.max(remote.page_number),
                self.total_pages.max(remote.total_pages),
                self.last_read_at,
            )
        };

        let (local_title, remote_title) = (&self.chapter_title, &remote.chapter_title);
        let chapter_title = match remote_micros.cmp(&local_micros) {
            Ordering::Greater => remote_title.clone().or_else(|| local_title.clone()),
            Ordering::Less => local_title.clone().or_else(|| remote_title.clone()),
            Ordering::Equal => local_title.clone().max(remote_title.clone()),
        };

        Self {
            canonical_id: self.canonical_id.clone().or_else(|| remote.canonical_id.clone()),
            source_id: self.source_id.clone(),
            entity_id: self.entity_id.clone(),
            chapter_number: self.chapter_number,
            chapter_title,
            page_number,
            total_pages,
            completed: self.completed || remote.completed,
            last_read_at,
        }
    }

    fn differs_from(&self, other: &Self) -> bool {
        self.chapter_title != other.chapter_title
            || self.page_number != other.page_number
            || self.total_pages != other.total_pages
            || self.completed != other.completed
            || !same_instant(self.last_read_at, other.last_read_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    #[test]
    fn test_max_timestamp_treats_none_as_oldest() {
        assert_eq!(max_timestamp(None, None), None);
        assert_eq!(max_timestamp(Some(t(1)), None), Some(t(1)));
        assert_eq!(max_timestamp(None, Some(t(1))), Some(t(1)));
        assert_eq!(max_timestamp(Some(t(1)), Some(t(2))), Some(t(2)));
        assert_eq!(max_timestamp(Some(t(3)), Some(t(2))), Some(t(3)));
    }

    #[test]
    fn test_sub_microsecond_difference_is_equal() {
        let precise = t(0) + Duration::nanoseconds(123_456_789);
        let truncated = t(0) + Duration::microseconds(123_456);
        assert!(same_instant(precise, truncated));
        assert_eq!(max_timestamp(Some(precise), Some(truncated)), Some(precise));
    }

    #[test]
    fn test_library_merge_takes_field_max() {
        let mut local = LibraryItem::new("s1", "m1", t(0));
        local.last_opened = Some(t(10));
        local.last_read = None;
        local.last_updated = Some(t(50));

        let mut remote = LibraryItem::new("s1", "m1", t(-5)).with_canonical_id("c1");
        remote.last_opened = Some(t(5));
        remote.last_read = Some(t(7));
        remote.last_updated = None;

        let merged = local.merge(&remote);
        assert_eq!(merged.canonical_id.as_ref().map(|c| c.as_str()), Some("c1"));
        assert_eq!(merged.date_added, t(-5));
        assert_eq!(merged.last_opened, Some(t(10)));
        assert_eq!(merged.last_read, Some(t(7)));
        assert_eq!(merged.last_updated, Some(t(50)));

        assert!(merged.differs_from(&local));
        assert!(merged.differs_from(&remote));
    }

    #[test]
    fn test_library_merge_is_commutative_on_synced_fields() {
        let mut a = LibraryItem::new("s1", "m1", t(0));
        a.last_opened = Some(t(3));
        let mut b = LibraryItem::new("s1", "m1", t(1));
        b.last_read = Some(t(4));

        assert!(!a.merge(&b).differs_from(&b.merge(&a)));
    }

    #[test]
    fn test_library_merge_is_idempotent() {
        let mut local = LibraryItem::new("s1", "m1", t(0));
        local.last_opened = Some(t(1));
        let remote = LibraryItem::new("s1", "m1", t(0));

        let once = local.merge(&remote);
        let twice = once.merge(&once.merge(&remote));
        assert!(!once.differs_from(&twice));
    }

    #[test]
    fn test_history_newer_read_wins_progress() {
        let mut local = HistoryEntry::new("s1", "m1", 4.0, t(10));
        local.page_number = 18;
        local.total_pages = 20;
        local.completed = true;
        local.chapter_title = Some("Chapter 4".to_string());

        let mut remote = HistoryEntry::new("s1", "m1", 4.0, t(20));
        remote.page_number = 2;
        remote.total_pages = 20;

        let merged = local.merge(&remote);
        assert_eq!(merged.page_number, 2);
        assert_eq!(merged.last_read_at, t(20));
        assert!(merged.completed);
        assert_eq!(merged.chapter_title.as_deref(), Some("Chapter 4"));
    }

    #[test]
    fn test_history_tie_takes_furthest_page() {
        let mut local = HistoryEntry::new("s1", "m1", 1.0, t(0));
        local.page_number = 3;
        let mut remote = HistoryEntry::new("s1", "m1", 1.0, t(0));
        remote.page_number = 9;
        remote.total_pages = 12;

        let merged = local.merge(&remote);
        assert_eq!(merged.page_number, 9);
        assert_eq!(merged.total_pages, 12);
        assert!(!remote.merge(&local).differs_from(&merged));
    }

    #[test]
    fn test_source_merge_keeps_known_origin() {
        let local = Source::new("en.example", "Example", "en");
        let remote = Source::new("en.example", "Example", "en")
            .with_origin_url("https://repo.example/index.json");

        let merged = local.merge(&remote);
        assert_eq!(
            merged.origin_url.as_deref(),
            Some("https://repo.example/index.json")
        );
        assert!(merged.differs_from(&local));
        assert!(!merged.differs_from(&remote));
    }

    #[test]
    fn test_source_merge_is_commutative() {
        let a = Source::new("en.example", "Example", "en")
            .with_origin_url("https://a.example/index.json");
        let b = Source::new("en.example", "Example (mirror)", "en-US")
            .with_origin_url("https://b.example/index.json");

        let ab = a.merge(&b);
        assert!(!ab.differs_from(&b.merge(&a)));
        assert_eq!(ab.name, "Example (mirror)");
        assert_eq!(ab.lang, "en-US");
        assert!(!ab.merge(&a).differs_from(&ab));
    }

    #[test]
    fn test_history_tie_picks_same_title_on_both_sides() {
        let mut a = HistoryEntry::new("s1", "m1", 2.0, t(0));
        a.chapter_title = Some("Ch. 2".to_string());
        let mut b = HistoryEntry::new("s1", "m1", 2.0, t(0));
        b.chapter_title = Some("Chapter 2".to_string());

        let ab = a.merge(&b);
        assert_eq!(ab.chapter_title.as_deref(), Some("Chapter 2"));
        assert!(!ab.differs_from(&b.merge(&a)));

        let untitled = HistoryEntry::new("s1", "m1", 2.0, t(0));
        assert_eq!(untitled.merge(&a).chapter_title.as_deref(), Some("Ch. 2"));
    }
}
