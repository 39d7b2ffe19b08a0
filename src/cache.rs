//! Query result caching with per-entry time-to-live.
//!
//! Entries are keyed by query identity and replaced wholesale on every
//! successful fetch. A failed fetch never evicts or overwrites what is
//! already cached: an expired entry keeps being served (marked stale) until a
//! fetch succeeds or the cache is cleared.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arrow::datatypes::Schema;
use arrow::record_batch::RecordBatch;
use parking_lot::Mutex;

use crate::error::{DashboardError, Result};

/// A single cached query result.
#[derive(Debug)]
struct CacheEntry {
    /// Cached payload
    payload: RecordBatch,
    /// When the payload was fetched
    fetched_at: Instant,
    /// How long the payload stays live
    ttl: Duration,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now.duration_since(self.fetched_at) < self.ttl
    }
}

/// How a lookup was answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from a live entry; no fetch was issued.
    Hit,
    /// Fetched from upstream and stored.
    Fetched,
    /// Fetch failed; an expired entry was served instead.
    Stale,
    /// Fetch failed and nothing was cached; an empty table was returned.
    Unavailable,
}

/// Result of [`ResultCache::get_or_fetch`].
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub table: RecordBatch,
    pub outcome: CacheOutcome,
    /// Age of the served payload (zero for fresh fetches and empty tables)
    pub age: Duration,
    /// The fetch failure, when one occurred
    pub failure: Option<DashboardError>,
}

impl CacheLookup {
    /// Whether upstream was queried for this lookup.
    pub fn fetched(&self) -> bool {
        !matches!(self.outcome, CacheOutcome::Hit)
    }

    /// Turn the lookup into a plain result, dropping the stale payload on failure.
    pub fn into_result(self) -> Result<RecordBatch> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.table),
        }
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stale_serves: u64,
    pub fetch_failures: u64,
    pub clears: u64,
    pub total_entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Memoizes warehouse query results for a bounded staleness window.
///
/// The cache is an explicit instance owned by whoever drives the refresh
/// loop. The entry map sits behind a mutex so lookups and clears are
/// mutually exclusive when the cache is shared; the fetch itself runs
/// outside the lock.
#[derive(Default)]
pub struct ResultCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    stats: Mutex<CacheStats>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live payload for `query_id`, or run `fetch` and cache its result.
    ///
    /// When `fetch` fails the existing entry is left untouched: an expired
    /// payload is served as [`CacheOutcome::Stale`], and a true miss yields
    /// an empty table as [`CacheOutcome::Unavailable`]. The failure is always
    /// carried in [`CacheLookup::failure`].
    pub fn get_or_fetch<F>(&self, query_id: &str, ttl: Duration, fetch: F) -> CacheLookup
    where
        F: FnOnce() -> Result<RecordBatch>,
    {
        let now = Instant::now();
        {
            let entries = self.entries.lock();
            if let Some(entry) = entries.get(query_id) {
                if entry.is_live(now) {
                    self.stats.lock().hits += 1;
                    tracing::debug!(query = query_id, "cache hit");
                    return CacheLookup {
                        table: entry.payload.clone(),
                        outcome: CacheOutcome::Hit,
                        age: now.duration_since(entry.fetched_at),
                        failure: None,
                    };
                }
            }
        }

        self.stats.lock().misses += 1;
        tracing::debug!(query = query_id, "cache miss, fetching");

        match fetch() {
            Ok(payload) => {
                let mut entries = self.entries.lock();
                entries.insert(
                    query_id.to_string(),
                    CacheEntry {
                        payload: payload.clone(),
                        fetched_at: Instant::now(),
                        ttl,
                    },
                );
                self.stats.lock().total_entries = entries.len();
                CacheLookup {
                    table: payload,
                    outcome: CacheOutcome::Fetched,
                    age: Duration::ZERO,
                    failure: None,
                }
            }
            Err(err) => {
                let entries = self.entries.lock();
                let mut stats = self.stats.lock();
                stats.fetch_failures += 1;
                match entries.get(query_id) {
                    Some(entry) => {
                        stats.stale_serves += 1;
                        let age = Instant::now().duration_since(entry.fetched_at);
                        tracing::warn!(
                            query = query_id,
                            kind = err.kind(),
                            age_secs = age.as_secs_f64(),
                            "fetch failed, serving stale result: {}",
                            err
                        );
                        CacheLookup {
                            table: entry.payload.clone(),
                            outcome: CacheOutcome::Stale,
                            age,
                            failure: Some(err),
                        }
                    }
                    None => {
                        tracing::warn!(
                            query = query_id,
                            kind = err.kind(),
                            "fetch failed with nothing cached: {}",
                            err
                        );
                        CacheLookup {
                            table: empty_table(),
                            outcome: CacheOutcome::Unavailable,
                            age: Duration::ZERO,
                            failure: Some(err),
                        }
                    }
                }
            }
        }
    }

    /// Evict every entry.
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        let mut stats = self.stats.lock();
        stats.clears += 1;
        stats.total_entries = 0;
    }

    /// Evict one entry. Returns whether it was present.
    pub fn invalidate(&self, query_id: &str) -> bool {
        let mut entries = self.entries.lock();
        let removed = entries.remove(query_id).is_some();
        self.stats.lock().total_entries = entries.len();
        removed
    }

    /// Whether a live entry exists for `query_id`.
    pub fn is_live(&self, query_id: &str) -> bool {
        let now = Instant::now();
        self.entries
            .lock()
            .get(query_id)
            .map(|e| e.is_live(now))
            .unwrap_or(false)
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("ResultCache")
            .field("entries", &stats.total_entries)
            .field("hit_rate", &format!("{:.1}%", stats.hit_rate() * 100.0))
            .finish()
    }
}

/// The table returned when nothing could be fetched or served.
pub fn empty_table() -> RecordBatch {
    RecordBatch::new_empty(Arc::new(Schema::empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int64Array;
    use arrow::datatypes::{DataType, Field};
    use std::cell::Cell;

    fn make_batch(n: i64) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![n]))]).unwrap()
    }

    fn first_id(batch: &RecordBatch) -> i64 {
        batch
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .value(0)
    }

    #[test]
    fn test_fetch_once_within_ttl() {
        let cache = ResultCache::new();
        let calls = Cell::new(0);
        let fetch = || {
            calls.set(calls.get() + 1);
            Ok(make_batch(1))
        };

        let first = cache.get_or_fetch("q", Duration::from_secs(60), fetch);
        let second = cache.get_or_fetch("q", Duration::from_secs(60), fetch);

        assert_eq!(calls.get(), 1);
        assert_eq!(first.outcome, CacheOutcome::Fetched);
        assert_eq!(second.outcome, CacheOutcome::Hit);
        assert!(!second.fetched());
        assert_eq!(first_id(&second.table), 1);
    }

    #[test]
    fn test_distinct_queries_have_distinct_entries() {
        let cache = ResultCache::new();
        cache.get_or_fetch("a", Duration::from_secs(60), || Ok(make_batch(1)));
        let b = cache.get_or_fetch("b", Duration::from_secs(60), || Ok(make_batch(2)));
        assert_eq!(b.outcome, CacheOutcome::Fetched);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_clear_forces_fetch() {
        let cache = ResultCache::new();
        let calls = Cell::new(0);
        let fetch = || {
            calls.set(calls.get() + 1);
            Ok(make_batch(calls.get()))
        };

        cache.get_or_fetch("q", Duration::from_secs(60), fetch);
        cache.clear();
        assert!(cache.is_empty());
        let after = cache.get_or_fetch("q", Duration::from_secs(60), fetch);

        assert_eq!(calls.get(), 2);
        assert_eq!(after.outcome, CacheOutcome::Fetched);
        assert_eq!(first_id(&after.table), 2);
        assert_eq!(cache.stats().clears, 1);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = ResultCache::new();
        cache.get_or_fetch("q", Duration::from_millis(1), || Ok(make_batch(1)));
        std::thread::sleep(Duration::from_millis(10));

        assert!(!cache.is_live("q"));
        let again = cache.get_or_fetch("q", Duration::from_millis(1), || Ok(make_batch(2)));
        assert_eq!(again.outcome, CacheOutcome::Fetched);
        assert_eq!(first_id(&again.table), 2);
    }

    #[test]
    fn test_failed_miss_returns_empty_table() {
        let cache = ResultCache::new();
        let lookup = cache.get_or_fetch("q", Duration::from_secs(30), || {
            Err(DashboardError::schema_unavailable("view missing"))
        });

        assert_eq!(lookup.outcome, CacheOutcome::Unavailable);
        assert_eq!(lookup.table.num_rows(), 0);
        assert!(lookup.failure.as_ref().unwrap().is_soft());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_failed_refetch_keeps_stale_entry() {
        let cache = ResultCache::new();
        cache.get_or_fetch("q", Duration::from_millis(1), || Ok(make_batch(7)));
        std::thread::sleep(Duration::from_millis(10));

        let lookup = cache.get_or_fetch("q", Duration::from_millis(1), || {
            Err(DashboardError::transient("timeout"))
        });
        assert_eq!(lookup.outcome, CacheOutcome::Stale);
        assert_eq!(first_id(&lookup.table), 7);
        assert!(lookup.age >= Duration::from_millis(10));
        assert_eq!(cache.len(), 1);

        let stats = cache.stats();
        assert_eq!(stats.stale_serves, 1);
        assert_eq!(stats.fetch_failures, 1);
    }

    #[test]
    fn test_hard_failure_does_not_evict() {
        let cache = ResultCache::new();
        cache.get_or_fetch("q", Duration::ZERO, || Ok(make_batch(3)));
        let lookup = cache.get_or_fetch("q", Duration::ZERO, || Err(DashboardError::auth("401")));

        assert!(lookup.failure.as_ref().unwrap().is_hard());
        assert_eq!(lookup.outcome, CacheOutcome::Stale);
        assert_eq!(cache.len(), 1);
        assert!(lookup.into_result().is_err());
    }

    #[test]
    fn test_invalidate_single_entry() {
        let cache = ResultCache::new();
        cache.get_or_fetch("a", Duration::from_secs(60), || Ok(make_batch(1)));
        cache.get_or_fetch("b", Duration::from_secs(60), || Ok(make_batch(2)));

        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert!(!cache.is_live("a"));
        assert!(cache.is_live("b"));
        assert_eq!(cache.stats().total_entries, 1);
    }

    #[test]
    fn test_stats_hit_rate() {
        let cache = ResultCache::new();
        cache.get_or_fetch("q", Duration::from_secs(60), || Ok(make_batch(1))); // miss
        cache.get_or_fetch("q", Duration::from_secs(60), || Ok(make_batch(1))); // hit
        cache.get_or_fetch("q", Duration::from_secs(60), || Ok(make_batch(1))); // hit

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 0.01);
    }
}
