//! One registry fetch per domain at a time.
//!
//! The first caller for a [`DomainKey`] opens a fetch epoch: it installs a
//! shared handle in the in-flight map and spawns the fetch as its own task.
//! Callers arriving while the epoch runs clone that handle and await the
//! same outcome. The map lock is only held to look up or install an entry,
//! never across an await.
//!
//! The fetch task owns an [`EpochGuard`] that clears the map entry when the
//! task ends, so a panicking or aborted fetch still releases its waiters
//! (they observe [`FetchError::Interrupted`]). A caller that stops waiting
//! only drops its handle; the fetch carries on for everyone else.

use crate::domain::DomainKey;
use crate::error::FetchError;
use crate::models::LookupResult;
use crate::registry::RegistryClient;
use crate::state::ResultStore;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub type FetchOutcome = Result<LookupResult, FetchError>;

type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

type InFlightMap = HashMap<DomainKey, InFlight>;

struct InFlight {
    epoch: u64,
    outcome: SharedFetch,
}

pub struct CoalescingScheduler {
    inflight: Arc<Mutex<InFlightMap>>,
    client: Arc<dyn RegistryClient>,
    store: Option<Arc<ResultStore>>,
    fetch_timeout: Duration,
    next_epoch: AtomicU64,
}

impl CoalescingScheduler {
    /// Without a store, successful results are returned but not cached.
    pub fn new(
        client: Arc<dyn RegistryClient>,
        store: Option<Arc<ResultStore>>,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
            client,
            store,
            fetch_timeout,
            next_epoch: AtomicU64::new(1),
        }
    }

    /// Joins the running fetch for `key`, or starts one.
    ///
    /// Every caller of the same epoch receives a clone of the same outcome.
    /// Failures are never cached.
    pub async fn fetch_or_join(&self, key: &DomainKey) -> FetchOutcome {
        let outcome = {
            let mut inflight = lock(&self.inflight);
            match inflight.get(key) {
                Some(running) => {
                    tracing::debug!("Joining fetch epoch {} for {}", running.epoch, key);
                    running.outcome.clone()
                }
                None => {
                    let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
                    let outcome = self.launch(key.clone(), epoch);
                    inflight.insert(
                        key.clone(),
                        InFlight {
                            epoch,
                            outcome: outcome.clone(),
                        },
                    );
                    outcome
                }
            }
        };

        outcome.await
    }

    /// Number of fetch epochs currently running.
    pub fn in_flight(&self) -> usize {
        lock(&self.inflight).len()
    }

    fn launch(&self, key: DomainKey, epoch: u64) -> SharedFetch {
        let guard = EpochGuard {
            inflight: Arc::clone(&self.inflight),
            key: key.clone(),
            epoch,
        };
        let client = Arc::clone(&self.client);
        let store = self.store.clone();
        let timeout = self.fetch_timeout;

        tracing::info!("Starting fetch epoch {} for {}", epoch, key);

        let task = tokio::spawn(async move {
            let _guard = guard;
            run_epoch(client.as_ref(), store.as_deref(), &key, timeout).await
        });

        task.map(move |joined| match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Fetch epoch {} ended abnormally: {}", epoch, e);
                Err(FetchError::Interrupted(e.to_string()))
            }
        })
        .boxed()
        .shared()
    }
}

async fn run_epoch(
    client: &dyn RegistryClient,
    store: Option<&ResultStore>,
    key: &DomainKey,
    timeout: Duration,
) -> FetchOutcome {
    let outcome = match tokio::time::timeout(timeout, client.lookup(key, timeout)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(FetchError::Timeout(timeout)),
    };

    match (&outcome, store) {
        (Ok(result), Some(store)) => {
            // Written before the epoch closes so the next caller finds it.
            if let Err(e) = store.upsert(key, result).await {
                tracing::warn!("Could not cache result for {}: {}", key, e);
            }
        }
        (Ok(_), None) => {}
        (Err(e), _) => tracing::warn!("Lookup for {} failed: {}", key, e),
    }

    outcome
}

/// Clears the in-flight entry for one epoch when dropped.
struct EpochGuard {
    inflight: Arc<Mutex<InFlightMap>>,
    key: DomainKey,
    epoch: u64,
}

impl Drop for EpochGuard {
    fn drop(&mut self) {
        let mut inflight = lock(&self.inflight);
        if inflight.get(&self.key).is_some_and(|running| running.epoch == self.epoch) {
            inflight.remove(&self.key);
        }
    }
}

/// The map holds no invariants a panicking holder could break.
fn lock(inflight: &Mutex<InFlightMap>) -> MutexGuard<'_, InFlightMap> {
    inflight.lock().unwrap_or_else(PoisonError::into_inner)
}
