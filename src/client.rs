//! Lookup coordinator.
//!
//! `YachtsClient` answers phishing queries from the local reputation cache
//! when it can and from the remote service when it must. Depending on the
//! [`StorageMode`] it also runs a periodic full resync and a live feed that
//! keep the cache current in the background.

use crate::config::{Config, StorageMode};
use crate::engine::{
    is_allowlisted, normalize_domain, Coalesced, Refresher, ReputationCache, RequestCoalescer,
};
use crate::error::{Error, Result};
use crate::feed::{ConnectionState, FeedConnector, FeedHandlers, LiveFeed, WebSocketConnector};
use crate::remote::{ChangeEvent, HttpRemote, ReputationRemote};
use crate::scanner::ContentScanner;
use crate::stats::{StatsCollector, StatsSnapshot};
use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest window accepted by [`YachtsClient::get_recent`]: seven days.
pub const MAX_RECENT_SECONDS: i64 = 7 * 24 * 60 * 60;

type Hook = Box<dyn Fn(&str) + Send + Sync>;

/// External notification hooks. Either may be unset.
#[derive(Default)]
struct Hooks {
    added: ArcSwapOption<Hook>,
    deleted: ArcSwapOption<Hook>,
}

impl Hooks {
    fn fire(slot: &ArcSwapOption<Hook>, domain: &str) {
        if let Some(hook) = slot.load_full() {
            hook(domain);
        }
    }
}

/// Applies feed events to the cache, then notifies external hooks.
struct FeedBridge {
    cache: ReputationCache,
    hooks: Arc<Hooks>,
    stats: Arc<StatsCollector>,
}

impl FeedHandlers for FeedBridge {
    fn on_add(&self, domain: &str) {
        self.cache.set(domain, true);
        self.stats.inc_feed_added();
        Hooks::fire(&self.hooks.added, domain);
    }

    fn on_delete(&self, domain: &str) {
        self.cache.set(domain, false);
        self.stats.inc_feed_deleted();
        Hooks::fire(&self.hooks.deleted, domain);
    }
}

pub struct YachtsClient {
    mode: StorageMode,
    cache_period: Duration,
    refresh_interval: Duration,
    stats_interval: Option<Duration>,
    remote: Arc<dyn ReputationRemote>,
    cache: ReputationCache,
    in_flight: RequestCoalescer,
    scanner: ContentScanner,
    hooks: Arc<Hooks>,
    stats: Arc<StatsCollector>,
    feed: Option<Arc<LiveFeed>>,
    shutdown: CancellationToken,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Assembles a [`YachtsClient`], defaulting any collaborator that was not
/// supplied to the configured HTTP API or WebSocket feed.
pub struct YachtsClientBuilder {
    config: Config,
    remote: Option<Arc<dyn ReputationRemote>>,
    connector: Option<Arc<dyn FeedConnector>>,
}

impl YachtsClientBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            remote: None,
            connector: None,
        }
    }

    pub fn with_remote(mut self, remote: Arc<dyn ReputationRemote>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Transport for the live feed. Only used by modes that run one.
    pub fn with_connector(mut self, connector: Arc<dyn FeedConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Fails only when the default HTTP remote cannot be built from the
    /// configuration.
    pub fn build(self) -> Result<YachtsClient> {
        let remote = match self.remote {
            Some(remote) => remote,
            None => Arc::new(HttpRemote::new(&self.config)?),
        };
        let connector = self
            .connector
            .unwrap_or_else(|| websocket_connector(&self.config));
        Ok(YachtsClient::with_parts(self.config, remote, connector))
    }
}

fn websocket_connector(config: &Config) -> Arc<dyn FeedConnector> {
    Arc::new(WebSocketConnector::new(
        config.feed_url.clone(),
        config.identity.clone(),
        config.request_timeout(),
    ))
}

impl YachtsClient {
    pub fn builder(config: Config) -> YachtsClientBuilder {
        YachtsClientBuilder::new(config)
    }

    /// Builds a client talking to the configured HTTP API and feed.
    pub fn new(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Builds a client around an injected remote. The live feed, if the mode
    /// asks for one, uses the configured WebSocket endpoint.
    pub fn with_remote(config: Config, remote: Arc<dyn ReputationRemote>) -> Self {
        let connector = websocket_connector(&config);
        Self::with_parts(config, remote, connector)
    }

    pub fn with_parts(
        config: Config,
        remote: Arc<dyn ReputationRemote>,
        connector: Arc<dyn FeedConnector>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let cache = ReputationCache::with_cancellation(shutdown.child_token());
        let hooks = Arc::new(Hooks::default());
        let stats = StatsCollector::new();

        let feed = config.storage_mode.uses_feed().then(|| {
            let bridge = Arc::new(FeedBridge {
                cache: cache.clone(),
                hooks: hooks.clone(),
                stats: stats.clone(),
            });
            Arc::new(LiveFeed::new(connector, bridge, config.reconnect_delay()))
        });

        let stats_interval = config
            .stats
            .enable
            .then(|| Duration::from_secs(config.stats.log_interval_seconds.max(1)));

        Self {
            mode: config.storage_mode,
            cache_period: config.cache_period(),
            refresh_interval: config.refresh_interval(),
            stats_interval,
            remote,
            cache,
            in_flight: RequestCoalescer::new(),
            scanner: ContentScanner::new(),
            hooks,
            stats,
            feed,
            shutdown,
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.mode
    }

    pub fn cache(&self) -> &ReputationCache {
        &self.cache
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Current live-feed state, or `None` when the mode has no feed.
    pub fn feed_state(&self) -> Option<ConnectionState> {
        self.feed.as_ref().map(|feed| feed.state())
    }

    pub fn set_on_domain_added(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        let hook: Hook = Box::new(hook);
        self.hooks.added.store(Some(Arc::new(hook)));
    }

    pub fn set_on_domain_deleted(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        let hook: Hook = Box::new(hook);
        self.hooks.deleted.store(Some(Arc::new(hook)));
    }

    /// Starts the background tasks the storage mode calls for. Calling it
    /// again is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);

        if self.mode.uses_refresher() {
            let refresher = Arc::new(Refresher::new(
                self.remote.clone(),
                self.cache.clone(),
                self.stats.clone(),
                self.refresh_interval,
            ));
            tasks.push(refresher.spawn(self.shutdown.child_token()));
        }

        if let Some(feed) = &self.feed {
            tasks.push(feed.clone().spawn(self.shutdown.child_token()));
        }

        if let Some(every) = self.stats_interval {
            tasks.push(
                self.stats
                    .clone()
                    .spawn_reporter(every, self.shutdown.child_token()),
            );
        }

        info!(mode = ?self.mode, tasks = tasks.len(), "Lookup client started");
    }

    /// Stops every background task, including pending cache expiries, and
    /// waits for them to finish.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        for task in tasks {
            if let Err(e) = task.await {
                error!("Background task panicked: {}", e);
            }
        }
        info!("Lookup client stopped");
    }

    /// Whether `domain` is a known phishing domain.
    ///
    /// Allow-listed platform domains short-circuit to `false`. Cached
    /// verdicts are returned without a network call. On a miss the remote
    /// verdict is cached for the configured period; concurrent misses for
    /// the same domain share one remote call.
    pub async fn is_phishing_domain(&self, domain: &str) -> Result<bool> {
        self.stats.inc_lookups();

        if is_allowlisted(domain) {
            self.stats.inc_allowlisted();
            return Ok(false);
        }

        let key = normalize_domain(domain);
        if key.is_empty() {
            return Err(Error::InvalidArgument("empty domain".to_string()));
        }

        if let Some(verdict) = self.cache.get(&key) {
            self.stats.inc_cache_hit();
            debug!(domain = %key, verdict, "Cache hit");
            return Ok(verdict);
        }

        self.check_remote(&key).await
    }

    async fn check_remote(&self, key: &str) -> Result<bool> {
        loop {
            match self.in_flight.register(key) {
                Coalesced::Leader(guard) => {
                    // A previous leader may have finished since our cache miss.
                    if let Some(verdict) = self.cache.get(key) {
                        guard.complete(Ok(verdict));
                        return Ok(verdict);
                    }

                    self.stats.inc_remote_check();
                    let result = self.remote.check_domain(key).await;
                    match &result {
                        Ok(verdict) => {
                            // Cache write and expiry are one step for waiters.
                            self.cache.set(key, *verdict);
                            self.cache.expire_after(key, self.cache_period);
                            debug!(domain = %key, verdict = *verdict, "Cached remote verdict");
                        }
                        Err(e) => warn!(domain = %key, error = %e, "Remote domain check failed"),
                    }
                    guard.complete(result.clone());
                    return result;
                }
                Coalesced::Follower(mut rx) => {
                    self.stats.inc_coalesced();
                    match rx.recv().await {
                        Ok(result) => return result,
                        // The leader was dropped before it finished. Take over.
                        Err(_) => debug!(domain = %key, "In-flight lookup abandoned, retrying"),
                    }
                }
            }
        }
    }

    /// Whether any URL in `text` points at a phishing domain. Stops at the
    /// first match.
    pub async fn is_phishing(&self, text: &str) -> Result<bool> {
        for host in self.scanner.extract_hosts(text) {
            if self.is_phishing_domain(&host).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Full list of flagged domains, straight from the remote (not cached).
    pub async fn get_phishing_domains(&self) -> Result<Vec<String>> {
        self.remote.fetch_full_list().await
    }

    pub async fn get_database_size(&self) -> Result<u64> {
        self.remote.fetch_database_size().await
    }

    /// Changes published within the last `seconds` seconds
    /// (1..=[`MAX_RECENT_SECONDS`]).
    pub async fn get_recent(&self, seconds: i64) -> Result<Vec<ChangeEvent>> {
        if seconds <= 0 || seconds > MAX_RECENT_SECONDS {
            return Err(Error::InvalidArgument(format!(
                "recent window must be between 1 and {MAX_RECENT_SECONDS} seconds, got {seconds}"
            )));
        }
        // Bounded above, so the cast cannot truncate.
        self.remote.fetch_recent(seconds as u32).await
    }
}

impl Drop for YachtsClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
