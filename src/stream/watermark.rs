//! Per-feed "highest observations-timestamp seen" filter (component C3).

use crate::feed::ID;

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accept,
    Drop,
}

struct Entry {
    timestamp: u64,
    seen_at: Instant,
}

/// Guards the watermark table behind a single mutex; the critical section
/// straddles only the compare-and-update, so offers from distinct feeds
/// never starve one another for long.
pub struct Watermark {
    table: Mutex<HashMap<[u8; 32], Entry>>,
}

impl Watermark {
    pub fn new() -> Self {
        Watermark {
            table: Mutex::new(HashMap::new()),
        }
    }

    /// Accepts `timestamp` for `feed_id` iff it is strictly greater than the
    /// highest timestamp previously accepted for that feed (or no timestamp
    /// has been accepted yet). Atomic across concurrent callers.
    pub async fn offer(&self, feed_id: &ID, timestamp: u64) -> Offer {
        let mut table = self.table.lock().await;
        match table.get(&feed_id.0) {
            Some(entry) if entry.timestamp >= timestamp => Offer::Drop,
            _ => {
                table.insert(
                    feed_id.0,
                    Entry {
                        timestamp,
                        seen_at: Instant::now(),
                    },
                );
                Offer::Accept
            }
        }
    }

    pub async fn get(&self, feed_id: &ID) -> Option<u64> {
        self.table.lock().await.get(&feed_id.0).map(|e| e.timestamp)
    }

    pub async fn set(&self, feed_id: &ID, timestamp: u64) {
        self.table.lock().await.insert(
            feed_id.0,
            Entry {
                timestamp,
                seen_at: Instant::now(),
            },
        );
    }

    /// Exports the table as `(feed_id, timestamp)` pairs for operator
    /// introspection or handoff; insertion order is not preserved.
    pub async fn export(&self) -> Vec<(ID, u64)> {
        self.table
            .lock()
            .await
            .iter()
            .map(|(bytes, entry)| (ID(*bytes), entry.timestamp))
            .collect()
    }

    /// Replaces the table's contents with `entries`. Existing entries not
    /// present in `entries` are dropped.
    pub async fn import(&self, entries: impl IntoIterator<Item = (ID, u64)>) {
        let mut table = self.table.lock().await;
        table.clear();
        let now = Instant::now();
        for (feed_id, timestamp) in entries {
            table.insert(feed_id.0, Entry {
                timestamp,
                seen_at: now,
            });
        }
    }

    pub async fn reset(&self) {
        self.table.lock().await.clear();
    }

    /// Evicts entries whose last acceptance is older than `max_age`, purely
    /// as a memory bound under heavy feed churn. Never re-admits a
    /// timestamp that would otherwise have been dropped within `max_age` of
    /// being accepted, since eviction only removes entries, it never lowers
    /// one still present.
    pub async fn evict_older_than(&self, max_age: Duration) {
        let mut table = self.table.lock().await;
        table.retain(|_, entry| entry.seen_at.elapsed() < max_age);
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::new()
    }
}
