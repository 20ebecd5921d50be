use crate::config::CheckerConfig;
use crate::domain::DomainKey;
use crate::error::CheckError;
use crate::models::{HistoryRecord, LookupResult};
use crate::registry::RegistryClient;
use crate::scheduler::CoalescingScheduler;
use crate::state::ResultStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub freshness: Duration,
    pub fetch_timeout: Duration,
    pub refresh_ahead: Option<Duration>,
}

impl From<&CheckerConfig> for ServiceSettings {
    fn from(config: &CheckerConfig) -> Self {
        Self {
            freshness: config.freshness(),
            fetch_timeout: config.fetch_timeout(),
            refresh_ahead: config.refresh_ahead(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub key: DomainKey,
    pub result: LookupResult,
    pub from_cache: bool,
}

/// Entry point for domain checks: normalizes input, serves fresh cache
/// hits and sends everything else through the scheduler.
pub struct QueryService {
    store: Arc<ResultStore>,
    scheduler: Arc<CoalescingScheduler>,
    settings: ServiceSettings,
}

impl QueryService {
    pub fn new(
        store: Arc<ResultStore>,
        client: Arc<dyn RegistryClient>,
        settings: ServiceSettings,
    ) -> Self {
        let scheduler = Arc::new(CoalescingScheduler::new(
            client,
            Some(Arc::clone(&store)),
            settings.fetch_timeout,
        ));
        Self {
            store,
            scheduler,
            settings,
        }
    }

    pub async fn check_domain(
        &self,
        raw_input: &str,
        explicit_zone: Option<&str>,
    ) -> Result<CheckOutcome, CheckError> {
        let key = DomainKey::normalize(raw_input, explicit_zone)?;
        tracing::info!("Checking {}", key);

        match self.store.get_if_fresh(&key, self.settings.freshness).await {
            Ok(Some(result)) => {
                tracing::info!("Serving cached result for {}", key);
                self.maybe_refresh_ahead(&key, &result);
                return Ok(CheckOutcome {
                    key,
                    result,
                    from_cache: true,
                });
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Cache unavailable for {}, fetching directly: {}", key, e),
        }

        let result = self.scheduler.fetch_or_join(&key).await?;
        Ok(CheckOutcome {
            key,
            result,
            from_cache: false,
        })
    }

    /// Most recent lookups, newest first. Storage failures yield an empty list.
    pub async fn history(&self, limit: u32) -> Vec<HistoryRecord> {
        self.store.recent_history(limit).await.unwrap_or_else(|e| {
            tracing::warn!("Could not read lookup history: {}", e);
            Vec::new()
        })
    }

    /// Fire-and-forget re-fetch for a hit nearing the end of its window. It
    /// goes through the scheduler, so it joins any fetch already running.
    fn maybe_refresh_ahead(&self, key: &DomainKey, result: &LookupResult) {
        let Some(threshold) = self.settings.refresh_ahead else {
            return;
        };
        let age = (Utc::now() - result.checked_at).to_std().unwrap_or_default();
        if age <= threshold {
            return;
        }

        tracing::debug!("Refreshing {} ahead of expiry (age {:?})", key, age);
        let scheduler = Arc::clone(&self.scheduler);
        let key = key.clone();
        tokio::spawn(async move {
            if let Err(e) = scheduler.fetch_or_join(&key).await {
                tracing::warn!("Background refresh for {} failed: {}", key, e);
            }
        });
    }
}
