// ── Timestamped snapshots ──

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One complete fetch result, stamped with when it was fetched.
///
/// Snapshots are immutable: the store replaces the whole value on every
/// successful fetch and never patches a payload in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<T> {
    pub payload: T,
    pub fetched_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl<T> Snapshot<T> {
    /// Stamp `payload` with the current time.
    pub fn new(payload: T, ttl: Duration) -> Self {
        Self::at(payload, Utc::now(), ttl)
    }

    pub fn at(payload: T, fetched_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            payload,
            fetched_at,
            ttl,
        }
    }

    /// Time since the fetch. Clock skew that puts `fetched_at` in the
    /// future reads as zero.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.age(now) > self.ttl
    }
}
