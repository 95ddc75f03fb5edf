use super::cache::{ReconcileSummary, ReputationCache};
use crate::error::Result;
use crate::remote::ReputationRemote;
use crate::stats::StatsCollector;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Periodically resyncs the cache against the remote full list.
pub struct Refresher {
    remote: Arc<dyn ReputationRemote>,
    cache: ReputationCache,
    stats: Arc<StatsCollector>,
    interval: Duration,
}

impl Refresher {
    pub fn new(
        remote: Arc<dyn ReputationRemote>,
        cache: ReputationCache,
        stats: Arc<StatsCollector>,
        interval: Duration,
    ) -> Self {
        Self {
            remote,
            cache,
            stats,
            interval,
        }
    }

    /// Fetches the full list once and reconciles the cache with it.
    pub async fn refresh_once(&self) -> Result<ReconcileSummary> {
        let domains = self.remote.fetch_full_list().await?;
        let listed = domains.len();
        let summary = self.cache.reconcile(domains);
        info!(
            listed,
            inserted = summary.inserted,
            flagged = summary.flagged,
            cleared = summary.cleared,
            cache_size = self.cache.len(),
            "Reputation cache refresh complete"
        );
        Ok(summary)
    }

    /// Runs until `cancel` fires. The first refresh happens immediately;
    /// a failed refresh is logged and retried on the next tick.
    pub async fn run(&self, cancel: CancellationToken) {
        // tokio panics on a zero period.
        let mut interval = tokio::time::interval(self.interval.max(MIN_INTERVAL));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.refresh_once() => outcome,
            };

            match outcome {
                Ok(_) => self.stats.record_refresh(true),
                Err(e) => {
                    self.stats.record_refresh(false);
                    warn!(error = %e, "Full-list refresh failed, retrying next interval");
                }
            }
        }
        info!("Refresher stopped");
    }

    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::remote::ChangeEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Serves scripted full-list responses, one per call; repeats the last.
    struct ScriptedRemote {
        responses: Mutex<Vec<Result<Vec<String>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedRemote {
        fn new(mut responses: Vec<Result<Vec<String>>>) -> Arc<Self> {
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait::async_trait]
    impl ReputationRemote for ScriptedRemote {
        async fn fetch_full_list(&self) -> Result<Vec<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.pop().unwrap()
            } else {
                responses.last().cloned().unwrap()
            }
        }

        async fn check_domain(&self, _domain: &str) -> Result<bool> {
            unreachable!("refresher never checks single domains")
        }

        async fn fetch_database_size(&self) -> Result<u64> {
            unreachable!()
        }

        async fn fetch_recent(&self, _seconds: u32) -> Result<Vec<ChangeEvent>> {
            unreachable!()
        }
    }

    fn list(domains: &[&str]) -> Result<Vec<String>> {
        Ok(domains.iter().map(|d| d.to_string()).collect())
    }

    #[tokio::test]
    async fn test_refresh_once_reconciles() {
        let remote = ScriptedRemote::new(vec![list(&["a.example"])]);
        let cache = ReputationCache::new();
        cache.set("b.example", true);

        let refresher = Refresher::new(
            remote,
            cache.clone(),
            StatsCollector::new(),
            Duration::from_secs(900),
        );
        let summary = refresher.refresh_once().await.unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.cleared, 1);
        assert_eq!(cache.get("a.example"), Some(true));
        assert_eq!(cache.get("b.example"), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_tick_does_not_stop_schedule() {
        let remote = ScriptedRemote::new(vec![
            list(&["a.example"]),
            Err(Error::Remote {
                status: Some(502),
                body: "bad gateway".into(),
            }),
            list(&["a.example", "c.example"]),
        ]);
        let cache = ReputationCache::new();
        let stats = StatsCollector::new();
        let refresher = Arc::new(Refresher::new(
            remote.clone(),
            cache.clone(),
            stats.clone(),
            Duration::from_secs(900),
        ));

        let cancel = CancellationToken::new();
        let handle = refresher.spawn(cancel.clone());

        // Immediate first tick
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("a.example"), Some(true));

        // Second tick fails, cache untouched
        tokio::time::sleep(Duration::from_secs(900)).await;
        assert_eq!(remote.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get("c.example"), None);

        // Third tick recovers
        tokio::time::sleep(Duration::from_secs(900)).await;
        assert_eq!(remote.calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.get("c.example"), Some(true));

        let s = stats.snapshot();
        assert_eq!(s.refreshes, 2);
        assert_eq!(s.refresh_failures, 1);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_runs_once_per_second() {
        let remote = ScriptedRemote::new(vec![list(&["a.example"])]);
        let refresher = Arc::new(Refresher::new(
            remote.clone(),
            ReputationCache::new(),
            StatsCollector::new(),
            Duration::ZERO,
        ));

        let cancel = CancellationToken::new();
        let handle = refresher.spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(remote.calls.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(remote.calls.load(Ordering::SeqCst), 2);

        cancel.cancel();
        handle.await.unwrap();
    }
}
