//! Coalescing of concurrent identical computations
//!
//! The first caller for a fingerprint becomes the leader and holds a
//! [`FlightGuard`]; later callers become followers and await the
//! leader's broadcast outcome. The guard removes the in-flight token on
//! drop, so removal is guaranteed on success, error, and cancellation
//! alike. A leader future that is dropped mid-computation closes the
//! channel and followers observe a typed failure rather than hanging or
//! silently recomputing.

use crate::cache::ComputedSet;
use crate::error::EngineError;
use crate::fingerprint::Fingerprint;
use ahash::AHashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Outcome shared between the leader and its followers
pub type SharedOutcome = Result<ComputedSet, Arc<EngineError>>;

type TokenMap = Arc<Mutex<AHashMap<Fingerprint, broadcast::Sender<SharedOutcome>>>>;

/// Per-fingerprint in-flight computation tokens
#[derive(Default)]
pub struct InflightTable {
    tokens: TokenMap,
}

/// The caller's role for one fingerprint
pub enum Flight {
    /// This caller runs the computation and must publish through the guard
    Leader(FlightGuard),
    /// Another caller is already computing; await its outcome
    Follower(broadcast::Receiver<SharedOutcome>),
}

impl InflightTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach to an existing computation or become its leader
    pub fn join_or_lead(&self, fingerprint: Fingerprint) -> Flight {
        let mut tokens = lock(&self.tokens);

        if let Some(sender) = tokens.get(&fingerprint) {
            return Flight::Follower(sender.subscribe());
        }

        // single value per flight; capacity 1 is enough
        let (sender, _) = broadcast::channel(1);
        tokens.insert(fingerprint, sender.clone());

        Flight::Leader(FlightGuard {
            tokens: Arc::clone(&self.tokens),
            fingerprint,
            sender: Some(sender),
        })
    }

    /// Number of computations currently in flight
    pub fn len(&self) -> usize {
        lock(&self.tokens).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scoped token for the leading computation
///
/// Dropping the guard removes the token and, if nothing was published,
/// closes the channel so followers fail instead of waiting forever.
pub struct FlightGuard {
    tokens: TokenMap,
    fingerprint: Fingerprint,
    sender: Option<broadcast::Sender<SharedOutcome>>,
}

impl FlightGuard {
    /// Broadcast the leader's outcome to every follower
    ///
    /// The token is removed before the send: every receiver subscribed
    /// while the token was visible, so none can miss the value, and a
    /// caller arriving afterwards leads a fresh computation instead of
    /// subscribing to a channel that has already fired.
    pub fn publish(mut self, outcome: SharedOutcome) {
        if let Some(sender) = self.sender.take() {
            lock(&self.tokens).remove(&self.fingerprint);
            // send fails only when there are no followers; that is fine
            let _ = sender.send(outcome);
        }
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        lock(&self.tokens).remove(&self.fingerprint);
    }
}

fn lock(
    tokens: &TokenMap,
) -> std::sync::MutexGuard<'_, AHashMap<Fingerprint, broadcast::Sender<SharedOutcome>>> {
    tokens.lock().unwrap_or_else(|e| e.into_inner())
}

/// Translate a follower's channel result into the engine error space
pub fn follower_outcome(
    received: Result<SharedOutcome, broadcast::error::RecvError>,
) -> Result<ComputedSet, EngineError> {
    match received {
        Ok(Ok(set)) => Ok(set),
        Ok(Err(error)) => Err(error.duplicate()),
        // leader dropped without publishing: cancelled mid-computation
        Err(_) => Err(EngineError::InternalCacheError(
            "in-flight computation was cancelled".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Query, SearchType};

    fn fingerprint(text: &str) -> Fingerprint {
        let query = Query::new(text, SearchType::Hybrid).unwrap();
        Fingerprint::derive(&query, "test-model")
    }

    #[tokio::test]
    async fn test_first_caller_leads() {
        let table = InflightTable::new();
        match table.join_or_lead(fingerprint("auth")) {
            Flight::Leader(_) => {}
            Flight::Follower(_) => panic!("first caller must lead"),
        }
    }

    #[tokio::test]
    async fn test_second_caller_follows_and_receives() {
        let table = InflightTable::new();
        let fp = fingerprint("auth");

        let guard = match table.join_or_lead(fp) {
            Flight::Leader(guard) => guard,
            Flight::Follower(_) => unreachable!(),
        };
        let mut rx = match table.join_or_lead(fp) {
            Flight::Follower(rx) => rx,
            Flight::Leader(_) => panic!("second caller must follow"),
        };

        guard.publish(Ok(ComputedSet::healthy(Arc::new(Vec::new()))));

        let outcome = follower_outcome(rx.recv().await);
        assert!(outcome.unwrap().results.is_empty());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_followers_share_the_leaders_failure() {
        let table = InflightTable::new();
        let fp = fingerprint("auth");

        let guard = match table.join_or_lead(fp) {
            Flight::Leader(guard) => guard,
            Flight::Follower(_) => unreachable!(),
        };
        let mut rx = match table.join_or_lead(fp) {
            Flight::Follower(rx) => rx,
            Flight::Leader(_) => unreachable!(),
        };

        guard.publish(Err(Arc::new(EngineError::Timeout { elapsed_ms: 100 })));

        let outcome = follower_outcome(rx.recv().await);
        assert!(matches!(outcome, Err(EngineError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_leader_fails_followers() {
        let table = InflightTable::new();
        let fp = fingerprint("auth");

        let guard = match table.join_or_lead(fp) {
            Flight::Leader(guard) => guard,
            Flight::Follower(_) => unreachable!(),
        };
        let mut rx = match table.join_or_lead(fp) {
            Flight::Follower(rx) => rx,
            Flight::Leader(_) => unreachable!(),
        };

        // leader dropped without publishing (cooperative cancellation)
        drop(guard);

        let outcome = follower_outcome(rx.recv().await);
        assert!(matches!(outcome, Err(EngineError::InternalCacheError(_))));
        assert!(table.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_every_joiner_observes_an_outcome_under_contention() {
        // a joiner that sees the token must receive the broadcast value;
        // one that misses it must lead. Neither path may surface a
        // cancellation error when every leader publishes.
        let table = Arc::new(InflightTable::new());
        let fp = fingerprint("auth");

        for _ in 0..200 {
            let mut handles = Vec::new();
            for _ in 0..4 {
                let table = Arc::clone(&table);
                handles.push(tokio::spawn(async move {
                    match table.join_or_lead(fp) {
                        Flight::Leader(guard) => {
                            guard.publish(Ok(ComputedSet::healthy(Arc::new(Vec::new()))));
                            Ok(())
                        }
                        Flight::Follower(mut rx) => {
                            follower_outcome(rx.recv().await).map(|_| ())
                        }
                    }
                }));
            }
            for handle in handles {
                handle
                    .await
                    .unwrap()
                    .expect("joiner saw a published flight as cancelled");
            }
        }

        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_token_removed_on_publish() {
        let table = InflightTable::new();
        let fp = fingerprint("auth");

        let guard = match table.join_or_lead(fp) {
            Flight::Leader(guard) => guard,
            Flight::Follower(_) => unreachable!(),
        };
        assert_eq!(table.len(), 1);

        guard.publish(Ok(ComputedSet::healthy(Arc::new(Vec::new()))));
        assert!(table.is_empty());

        // a fresh caller leads again
        match table.join_or_lead(fp) {
            Flight::Leader(_) => {}
            Flight::Follower(_) => panic!("token should have been removed"),
        }
    }
}
