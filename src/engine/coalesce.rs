//! Single-flight de-duplication of on-demand lookups.
//!
//! When several callers miss the cache for the same domain at once, only the
//! first one (the leader) asks the remote service. The others subscribe to the
//! leader's result and receive a clone of it.

use crate::error::Result;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

type Verdict = Result<bool>;

#[derive(Default)]
pub struct RequestCoalescer {
    in_flight: DashMap<Box<str>, broadcast::Sender<Verdict>>,
}

pub enum Coalesced<'a> {
    /// First caller for this key; must perform the lookup and `complete()`.
    Leader(LeaderGuard<'a>),
    /// A lookup is already running; wait on the receiver.
    Follower(broadcast::Receiver<Verdict>),
}

impl RequestCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: &str) -> Coalesced<'_> {
        // Entry API keeps check-and-insert atomic per shard.
        match self.in_flight.entry(key.into()) {
            Entry::Occupied(entry) => {
                debug!(domain = %key, "Joining in-flight lookup");
                Coalesced::Follower(entry.get().subscribe())
            }
            Entry::Vacant(entry) => {
                let (tx, _rx) = broadcast::channel(1);
                entry.insert(tx);
                Coalesced::Leader(LeaderGuard {
                    coalescer: self,
                    key: key.into(),
                    completed: false,
                })
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

/// Held by the leader of an in-flight lookup.
///
/// Dropping it without calling `complete` (for example when the leader's
/// future is cancelled) unregisters the key; waiters then see a closed
/// channel and may register again.
pub struct LeaderGuard<'a> {
    coalescer: &'a RequestCoalescer,
    key: Box<str>,
    completed: bool,
}

impl LeaderGuard<'_> {
    pub fn complete(mut self, result: Verdict) {
        self.completed = true;
        if let Some((_, tx)) = self.coalescer.in_flight.remove(&self.key) {
            // No receivers is fine.
            let _ = tx.send(result);
        }
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.coalescer.in_flight.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn test_followers_receive_leader_result() {
        let coalescer = RequestCoalescer::new();

        let leader = match coalescer.register("evil.example") {
            Coalesced::Leader(guard) => guard,
            Coalesced::Follower(_) => panic!("first registration must lead"),
        };
        let mut follower = match coalescer.register("evil.example") {
            Coalesced::Follower(rx) => rx,
            Coalesced::Leader(_) => panic!("second registration must follow"),
        };
        assert_eq!(coalescer.in_flight(), 1);

        leader.complete(Ok(true));
        assert_eq!(follower.recv().await.unwrap(), Ok(true));
        assert_eq!(coalescer.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_errors_are_shared() {
        let coalescer = RequestCoalescer::new();
        let Coalesced::Leader(leader) = coalescer.register("x.example") else {
            panic!("expected leader");
        };
        let Coalesced::Follower(mut rx) = coalescer.register("x.example") else {
            panic!("expected follower");
        };

        let err = Error::Remote {
            status: Some(500),
            body: "boom".into(),
        };
        leader.complete(Err(err.clone()));
        assert_eq!(rx.recv().await.unwrap(), Err(err));
    }

    #[tokio::test]
    async fn test_dropped_leader_releases_key() {
        let coalescer = RequestCoalescer::new();
        let Coalesced::Leader(leader) = coalescer.register("y.example") else {
            panic!("expected leader");
        };
        let Coalesced::Follower(mut rx) = coalescer.register("y.example") else {
            panic!("expected follower");
        };

        drop(leader);
        assert!(rx.recv().await.is_err());
        assert!(matches!(
            coalescer.register("y.example"),
            Coalesced::Leader(_)
        ));
    }

    #[test]
    fn test_distinct_keys_lead_independently() {
        let coalescer = RequestCoalescer::new();
        let a = coalescer.register("a.example");
        let b = coalescer.register("b.example");
        assert!(matches!(a, Coalesced::Leader(_)));
        assert!(matches!(b, Coalesced::Leader(_)));
        assert_eq!(coalescer.in_flight(), 2);
    }
}
