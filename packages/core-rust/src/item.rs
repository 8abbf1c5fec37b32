//! The versioned item that is the unit of storage, plus list paging results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A versioned JSON item stored under one scope + key.
///
/// `etag` is derived from `version` (`"<version>"`), never stored
/// separately. An item is *active* iff `expires_at` is `None` or strictly
/// in the future.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredItem {
    pub key: String,
    pub value: serde_json::Value,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredItem {
    /// The quoted decimal ETag for this item's current version.
    #[must_use]
    pub fn etag(&self) -> String {
        format!("\"{}\"", self.version)
    }

    /// Whether this item is active as of `now` (not expired).
    #[must_use]
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => true,
            Some(expiry) => expiry > now,
        }
    }
}

/// A page of active items returned by `list`.
///
/// `next_cursor` is `Some` iff at least one active key strictly greater
/// than the last emitted key exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResult {
    pub items: Vec<StoredItem>,
    pub next_cursor: Option<String>,
}

/// Options accepted by `put`.
///
/// Omitting `ttl_seconds` on an update clears any prior expiry, per the
/// adapter contract.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub ttl_seconds: Option<i64>,
    pub if_match_version: Option<i64>,
}

/// Options accepted by `delete`.
#[derive(Debug, Clone, Default)]
pub struct DeleteOptions {
    pub if_match_version: Option<i64>,
}

/// One entry of a `batchPut` request, carrying its own TTL/precondition.
#[derive(Debug, Clone)]
pub struct BatchPutEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub options: PutOptions,
}

/// Paging/filtering parameters accepted by `list`.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub prefix: Option<String>,
    pub cursor: Option<String>,
    pub limit: usize,
}

/// Outcome of a backend round-trip check, never an error: failure is
/// conveyed in `ok`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub ok: bool,
    pub details: Option<String>,
}

impl HealthStatus {
    #[must_use]
    pub fn healthy() -> Self {
        Self {
            ok: true,
            details: None,
        }
    }

    #[must_use]
    pub fn unhealthy(details: impl Into<String>) -> Self {
        Self {
            ok: false,
            details: Some(details.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(version: i64, expires_at: Option<DateTime<Utc>>) -> StoredItem {
        let now = Utc::now();
        StoredItem {
            key: "alpha".to_string(),
            value: serde_json::json!({"enabled": true}),
            version,
            created_at: now,
            updated_at: now,
            expires_at,
        }
    }

    #[test]
    fn etag_is_quoted_decimal_version() {
        assert_eq!(item(1, None).etag(), "\"1\"");
        assert_eq!(item(42, None).etag(), "\"42\"");
    }

    #[test]
    fn item_without_expiry_is_always_active() {
        let it = item(1, None);
        assert!(it.is_active_at(Utc::now() + Duration::days(365)));
    }

    #[test]
    fn item_is_active_before_expiry_and_inactive_after() {
        let now = Utc::now();
        let it = item(1, Some(now + Duration::seconds(5)));
        assert!(it.is_active_at(now));
        assert!(!it.is_active_at(now + Duration::seconds(10)));
    }

    #[test]
    fn item_at_exact_expiry_instant_is_inactive() {
        let now = Utc::now();
        let it = item(1, Some(now));
        assert!(!it.is_active_at(now));
    }

    #[test]
    fn health_status_constructors() {
        assert!(HealthStatus::healthy().ok);
        let bad = HealthStatus::unhealthy("connection refused");
        assert!(!bad.ok);
        assert_eq!(bad.details.unwrap(), "connection refused");
    }
}
