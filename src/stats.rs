use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Lock-free counters describing how lookups were answered.
#[derive(Debug, Default)]
pub struct StatsCollector {
    lookups: AtomicU64,
    allowlisted: AtomicU64,
    cache_hits: AtomicU64,
    remote_checks: AtomicU64,
    coalesced: AtomicU64,
    feed_added: AtomicU64,
    feed_deleted: AtomicU64,
    refreshes: AtomicU64,
    refresh_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub lookups: u64,
    pub allowlisted: u64,
    pub cache_hits: u64,
    pub remote_checks: u64,
    pub coalesced: u64,
    pub feed_added: u64,
    pub feed_deleted: u64,
    pub refreshes: u64,
    pub refresh_failures: u64,
}

impl StatsCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_lookups(&self) {
        self.lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_allowlisted(&self) {
        self.allowlisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_remote_check(&self) {
        self.remote_checks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_feed_added(&self) {
        self.feed_added.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_feed_deleted(&self) {
        self.feed_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh(&self, success: bool) {
        if success {
            self.refreshes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.refresh_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lookups: self.lookups.load(Ordering::Relaxed),
            allowlisted: self.allowlisted.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            remote_checks: self.remote_checks.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            feed_added: self.feed_added.load(Ordering::Relaxed),
            feed_deleted: self.feed_deleted.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
        }
    }

    /// Logs a stats line every `every` until `cancel` fires.
    pub fn spawn_reporter(
        self: Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = time::interval(every);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => self.dump_stats(),
                }
            }
        })
    }

    fn dump_stats(&self) {
        let s = self.snapshot();
        let hit_pct = if s.lookups > 0 {
            (s.cache_hits as f64 / s.lookups as f64) * 100.0
        } else {
            0.0
        };

        info!(
            "STATS DUMP: Lookups: {}, Allowlisted: {}, CacheHits: {} ({:.1}%), RemoteChecks: {}, Coalesced: {}, Feed: +{}/-{}, Refreshes: {} ({} failed)",
            s.lookups,
            s.allowlisted,
            s.cache_hits,
            hit_pct,
            s.remote_checks,
            s.coalesced,
            s.feed_added,
            s.feed_deleted,
            s.refreshes,
            s.refresh_failures
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_show_up_in_snapshot() {
        let stats = StatsCollector::new();
        stats.inc_lookups();
        stats.inc_lookups();
        stats.inc_cache_hit();
        stats.record_refresh(true);
        stats.record_refresh(false);

        let s = stats.snapshot();
        assert_eq!(s.lookups, 2);
        assert_eq!(s.cache_hits, 1);
        assert_eq!(s.refreshes, 1);
        assert_eq!(s.refresh_failures, 1);
        assert_eq!(s.remote_checks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reporter_stops_on_cancel() {
        let stats = StatsCollector::new();
        let cancel = CancellationToken::new();
        let handle = stats.spawn_reporter(Duration::from_secs(5), cancel.clone());

        tokio::time::sleep(Duration::from_secs(12)).await;
        cancel.cancel();
        handle.await.unwrap();
    }
}
