use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Normalizes a host into the form used as a cache key.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Outcome of a full-list reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Keys that were not cached before.
    pub inserted: usize,
    /// Existing keys now marked as phishing.
    pub flagged: usize,
    /// Existing keys now marked as cleared.
    pub cleared: usize,
}

/// Shared domain -> verdict map.
///
/// A single `RwLock` guards the whole map, so a reconciliation pass is
/// observed either entirely or not at all. Clones share the same storage.
#[derive(Debug, Clone)]
pub struct ReputationCache {
    entries: Arc<RwLock<FxHashMap<Box<str>, bool>>>,
    // Cancels pending expiry timers on shutdown.
    shutdown: CancellationToken,
}

impl ReputationCache {
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    pub fn with_cancellation(shutdown: CancellationToken) -> Self {
        Self {
            entries: Arc::new(RwLock::new(FxHashMap::default())),
            shutdown,
        }
    }

    /// Returns the cached verdict, or `None` when the domain is unknown.
    pub fn get(&self, domain: &str) -> Option<bool> {
        let key = normalize_domain(domain);
        let guard = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        guard.get(key.as_str()).copied()
    }

    pub fn set(&self, domain: &str, verdict: bool) {
        let key = normalize_domain(domain).into_boxed_str();
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(key, verdict);
    }

    pub fn remove(&self, domain: &str) -> Option<bool> {
        let key = normalize_domain(domain);
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        guard.remove(key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current contents, mostly useful for inspection and tests.
    pub fn snapshot(&self) -> FxHashMap<String, bool> {
        let guard = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        guard.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    /// Resyncs every verdict against the remote full list.
    ///
    /// Existing keys become `true` if listed and `false` otherwise; listed
    /// domains that are not cached yet are inserted as `true`. Keys are never
    /// removed here, so the cache only grows.
    pub fn reconcile<I, S>(&self, full_list: I) -> ReconcileSummary
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // Normalize outside the lock.
        let listed: FxHashSet<Box<str>> = full_list
            .into_iter()
            .map(|d| normalize_domain(d.as_ref()).into_boxed_str())
            .filter(|d| !d.is_empty())
            .collect();

        let mut summary = ReconcileSummary::default();
        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        for (domain, verdict) in guard.iter_mut() {
            let now_listed = listed.contains(domain);
            if now_listed && !*verdict {
                summary.flagged += 1;
            } else if !now_listed && *verdict {
                summary.cleared += 1;
            }
            *verdict = now_listed;
        }

        for domain in listed {
            if !guard.contains_key(&domain) {
                guard.insert(domain, true);
                summary.inserted += 1;
            }
        }

        summary
    }

    /// Schedules a one-shot removal of `domain` once `after` has elapsed.
    ///
    /// A zero duration removes the key immediately. The removal applies to
    /// whatever verdict is stored at that moment, including one written by a
    /// later reconciliation. Must be called from within a Tokio runtime
    /// unless `after` is zero.
    pub fn expire_after(&self, domain: &str, after: Duration) {
        if after.is_zero() {
            self.remove(domain);
            return;
        }

        let cache = self.clone();
        let domain = normalize_domain(domain);
        tokio::spawn(async move {
            tokio::select! {
                _ = cache.shutdown.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    if cache.remove(&domain).is_some() {
                        debug!(domain = %domain, "Expired on-demand cache entry");
                    }
                }
            }
        });
    }
}

impl Default for ReputationCache {
    fn default() -> Self {
        Self::new()
    }
}
