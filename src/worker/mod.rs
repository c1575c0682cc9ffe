//! Proxy lifecycle — install, activate, active.
//!
//! The worker owns the transition between cache generations. Installation
//! marks the worker as ready to take over immediately instead of waiting for
//! a previous generation to wind down. Activation prunes every cache bucket
//! whose name is not the current version label and does not complete until
//! all deletions have settled; only then is traffic served.

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cache::CacheStorage;

/// Lifecycle phase of the worker. Transitions are strictly
/// `Installing → Activating → Active`, sequenced by the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Installing,
    Activating,
    Active,
}

/// Owns the lifecycle of one proxy generation and its cache storage.
///
/// # Examples
///
/// ```
/// use portico::cache::CacheStorage;
/// use portico::worker::{Phase, Worker};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let storage = CacheStorage::new();
/// storage.open("portal-v0").await;
///
/// let mut worker = Worker::new(storage.clone(), "portal-v1");
/// worker.install();
/// worker.activate().await;
///
/// assert_eq!(worker.phase(), Phase::Active);
/// assert_eq!(storage.bucket_names().await, vec!["portal-v1".to_owned()]);
/// # });
/// ```
#[derive(Debug)]
pub struct Worker {
    storage: CacheStorage,
    version: String,
    phase: Phase,
    immediate_takeover: bool,
}

impl Worker {
    /// Creates a worker in the `Installing` phase for the given version label.
    pub fn new(storage: CacheStorage, version: impl Into<String>) -> Self {
        Self {
            storage,
            version: version.into(),
            phase: Phase::Installing,
            immediate_takeover: false,
        }
    }

    /// Returns the current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the current cache version label.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns `true` once [`install`](Self::install) has run.
    pub fn takes_over_immediately(&self) -> bool {
        self.immediate_takeover
    }

    /// Installation: signal readiness to activate immediately.
    ///
    /// There is no waiting on a previous generation and no error condition;
    /// the only observable effect is that activation may proceed at once.
    pub fn install(&mut self) {
        self.immediate_takeover = true;
        info!(version = %self.version, "installed — immediate takeover requested");
    }

    /// Activation: prune every bucket not named with the current version label.
    ///
    /// Deletions run in parallel and are best-effort: one bucket failing to
    /// delete does not stop the others. The phase does not advance to
    /// `Active` until every deletion has settled. The current bucket is
    /// opened (created if absent) so that exactly one generation exists
    /// afterwards. Returns the number of buckets pruned.
    pub async fn activate(&mut self) -> usize {
        self.phase = Phase::Activating;
        info!(version = %self.version, "activating");

        let mut deletions = JoinSet::new();
        for name in self.storage.bucket_names().await {
            if name == self.version {
                continue;
            }
            let storage = self.storage.clone();
            deletions.spawn(async move {
                let removed = storage.delete(&name).await;
                (name, removed)
            });
        }

        let mut pruned = 0;
        while let Some(settled) = deletions.join_next().await {
            match settled {
                Ok((name, true)) => {
                    debug!(bucket = name, "pruned stale cache generation");
                    pruned += 1;
                }
                Ok((name, false)) => {
                    // Raced with another deletion; nothing left to remove.
                    debug!(bucket = name, "stale bucket already gone");
                }
                Err(e) => warn!(error = %e, "cache pruning task failed"),
            }
        }

        self.storage.open(&self.version).await;

        self.phase = Phase::Active;
        info!(version = %self.version, pruned, "active");
        pruned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSION: &str = "portal-cache-v2";

    #[tokio::test]
    async fn install_requests_immediate_takeover() {
        let mut worker = Worker::new(CacheStorage::new(), VERSION);
        assert_eq!(worker.phase(), Phase::Installing);
        assert!(!worker.takes_over_immediately());

        worker.install();
        assert!(worker.takes_over_immediately());
        // Activation may proceed at once, with no draining delay.
        worker.activate().await;
        assert_eq!(worker.phase(), Phase::Active);
    }

    #[tokio::test]
    async fn activate_prunes_stale_generations() {
        let storage = CacheStorage::new();
        for stale in ["portal-cache-v0", "portal-cache-v1", "unrelated"] {
            storage.open(stale).await;
        }
        storage.open(VERSION).await;

        let mut worker = Worker::new(storage.clone(), VERSION);
        worker.install();
        let pruned = worker.activate().await;

        assert_eq!(pruned, 3);
        assert_eq!(storage.bucket_names().await, vec![VERSION.to_owned()]);
    }

    #[tokio::test]
    async fn activate_with_no_prior_generations() {
        let storage = CacheStorage::new();
        let mut worker = Worker::new(storage.clone(), VERSION);
        worker.install();
        let pruned = worker.activate().await;

        assert_eq!(pruned, 0);
        // The current generation exists afterwards either way.
        assert_eq!(storage.bucket_names().await, vec![VERSION.to_owned()]);
    }

    #[tokio::test]
    async fn activate_keeps_current_bucket_contents() {
        let storage = CacheStorage::new();
        let bucket = storage.open(VERSION).await;
        bucket
            .put(
                crate::http::RequestIdentity::new(crate::http::Method::Get, "/app.js"),
                crate::cache::StoredResponse::snapshot(
                    &crate::http::Response::new(crate::http::StatusCode::Ok).body("x"),
                ),
            )
            .await;
        storage.open("portal-cache-v0").await;

        let mut worker = Worker::new(storage.clone(), VERSION);
        worker.install();
        worker.activate().await;

        let bucket = storage.open(VERSION).await;
        assert_eq!(bucket.len().await, 1);
    }
}
