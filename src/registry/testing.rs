//! In-process registry stand-in for cache and scheduler tests.

use super::RegistryClient;
use crate::domain::DomainKey;
use crate::error::FetchError;
use crate::models::{Availability, LookupResult, RegistrationDetails};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type Responder = dyn Fn(&DomainKey, usize) -> Result<LookupResult, FetchError> + Send + Sync;

/// Answers lookups from a closure after an optional delay, counting calls.
/// The closure receives the key and the zero-based call number.
pub struct ScriptedClient {
    calls: AtomicUsize,
    delay: Duration,
    responder: Box<Responder>,
}

impl ScriptedClient {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&DomainKey, usize) -> Result<LookupResult, FetchError> + Send + Sync + 'static,
    {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            responder: Box::new(responder),
        }
    }

    /// Every domain is registered to `owner`.
    pub fn registered(owner: &str) -> Self {
        let owner = owner.to_string();
        Self::new(move |_, _| {
            Ok(LookupResult::new(
                Availability::Registered(RegistrationDetails {
                    owner: Some(owner.clone()),
                    ..Default::default()
                }),
                Utc::now(),
            ))
        })
    }

    pub fn available() -> Self {
        Self::new(|_, _| Ok(LookupResult::new(Availability::Available, Utc::now())))
    }

    pub fn failing(error: FetchError) -> Self {
        Self::new(move |_, _| Err(error.clone()))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RegistryClient for ScriptedClient {
    fn lookup<'a>(
        &'a self,
        key: &'a DomainKey,
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<LookupResult, FetchError>> {
        async move {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            (self.responder)(key, call)
        }
        .boxed()
    }
}
