//! Keyset pagination over `(created_on DESC, id DESC)`.
//!
//! A cursor names the last row of the previous page. The next page holds
//! rows strictly after it in that order, so rows inserted between page
//! fetches never shift existing rows across a page boundary.

use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::notification::NotificationObject;
use crate::types::{DbId, Timestamp};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 500;

/// Clamp a user-provided limit to `[1, max]`, falling back to `default`.
pub fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).max(1).min(max)
}

/// Position after which a page starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub created_on: Timestamp,
    pub id: DbId,
}

impl Cursor {
    pub fn of(notification: &NotificationObject) -> Self {
        Self {
            created_on: notification.created_on,
            id: notification.id,
        }
    }

    /// Whether a row sorts strictly after this cursor in descending order.
    pub fn precedes(&self, created_on: Timestamp, id: DbId) -> bool {
        (created_on, id) < (self.created_on, self.id)
    }

    /// Opaque text form: `<created_on micros>.<id>`.
    pub fn encode(&self) -> String {
        format!("{}.{}", self.created_on.timestamp_micros(), self.id)
    }

    pub fn decode(raw: &str) -> CoreResult<Self> {
        let invalid = || CoreError::Validation(format!("invalid pagination cursor {raw:?}"));
        let (micros, id) = raw.split_once('.').ok_or_else(invalid)?;
        let micros: i64 = micros.parse().map_err(|_| invalid())?;
        let id: DbId = id.parse().map_err(|_| invalid())?;
        let created_on = Utc
            .timestamp_micros(micros)
            .single()
            .ok_or_else(invalid)?;
        Ok(Self { created_on, id })
    }
}

/// Page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub after: Option<Cursor>,
}

impl Default for Page {
    fn default() -> Self {
        Self::first(DEFAULT_PAGE_SIZE)
    }
}

impl Page {
    pub fn first(limit: i64) -> Self {
        Self {
            limit: clamp_limit(Some(limit), DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE),
            after: None,
        }
    }

    pub fn after(cursor: Cursor, limit: i64) -> Self {
        Self {
            after: Some(cursor),
            ..Self::first(limit)
        }
    }
}

/// One page of results and the cursor for the next one, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageOf<T> {
    pub items: Vec<T>,
    pub next: Option<Cursor>,
}

impl<T> PageOf<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next: None,
        }
    }
}

impl PageOf<NotificationObject> {
    /// Build a page from up to `limit + 1` sorted rows.
    ///
    /// The extra row only signals that another page exists.
    pub fn from_overfetch(mut rows: Vec<NotificationObject>, limit: i64) -> Self {
        let limit = usize::try_from(limit).unwrap_or(0);
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next = if has_more { rows.last().map(Cursor::of) } else { None };
        Self { items: rows, next }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::types::now_micros;

    #[test]
    fn clamp_limit_bounds() {
        assert_eq!(clamp_limit(None, 20, 100), 20);
        assert_eq!(clamp_limit(Some(200), 20, 100), 100);
        assert_eq!(clamp_limit(Some(0), 20, 100), 1);
    }

    #[test]
    fn cursor_text_form_round_trips() {
        let cursor = Cursor {
            created_on: now_micros(),
            id: 42,
        };
        assert_eq!(Cursor::decode(&cursor.encode()).unwrap(), cursor);
    }

    #[test]
    fn cursor_decode_rejects_garbage() {
        for raw in ["", "abc", "12", "x.1", "1.y"] {
            assert_matches!(Cursor::decode(raw), Err(CoreError::Validation(_)));
        }
    }

    #[test]
    fn precedes_breaks_ties_on_id() {
        let t = now_micros();
        let cursor = Cursor { created_on: t, id: 10 };
        assert!(cursor.precedes(t, 9));
        assert!(!cursor.precedes(t, 10));
        assert!(!cursor.precedes(t, 11));
        assert!(cursor.precedes(t - chrono::Duration::seconds(1), 99));
    }
}
