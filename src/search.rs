//! Search pagination: estimating how many result pages a query has.
//!
//! The site does not report a page count, so the last page is found by
//! bisection over "does page N have any results". Results are cached per
//! query in a [`MaxPageCache`] with a time-to-live.
//!
//! The bisection assumes pages are non-empty up to the true last page and
//! empty after it. If the site returns an empty page in the middle of the
//! range, the estimate comes out low.
//!
//! # Examples
//!
//! ```rust
//! use jmfetch::search::bisect_last_page;
//!
//! # async fn example() {
//! // Pretend the query has 37 pages of results.
//! let last = bisect_last_page(3000, |page| async move { page <= 37 }).await;
//! assert_eq!(last, 37);
//! # }
//! ```

use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

/// Finds the highest page in `1..=ceiling` for which `has_results` holds.
///
/// Page 1 is assumed to have results; callers check it before bisecting.
pub async fn bisect_last_page<F, Fut>(ceiling: u32, mut has_results: F) -> u32
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = bool>,
{
    let mut low = 1;
    let mut high = ceiling.max(1);

    while low < high {
        let mid = (low + high + 1) / 2;
        if has_results(mid).await {
            low = mid;
        } else {
            high = mid - 1;
        }
    }

    low
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    max_page: u32,
    stored_at: Instant,
}

/// Query → last-page cache shared by concurrent callers.
///
/// Reads take the shared lock; inserts take the exclusive lock. Entries older
/// than the TTL are treated as absent and overwritten on the next insert.
#[derive(Debug)]
pub struct MaxPageCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl MaxPageCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Cached last page for `query`, if present and fresh.
    pub fn get(&self, query: &str) -> Option<u32> {
        self.entries
            .read()
            .get(query)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.max_page)
    }

    pub fn insert(&self, query: impl Into<String>, max_page: u32) {
        self.entries.write().insert(
            query.into(),
            CacheEntry {
                max_page,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for MaxPageCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(24 * 60 * 60))
    }
}
