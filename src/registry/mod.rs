pub mod parser;

#[cfg(test)]
pub mod testing;

use crate::config::RegistryConfig;
use crate::domain::DomainKey;
use crate::error::FetchError;
use crate::models::LookupResult;
use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, REFERER};
use std::time::Duration;
use url::Url;

/// The external lookup the cache layer sits in front of.
///
/// Implementations classify every non-answer (timeouts, unreachable
/// registry, pages they cannot read) as a [`FetchError`].
pub trait RegistryClient: Send + Sync {
    fn lookup<'a>(
        &'a self,
        key: &'a DomainKey,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<LookupResult, FetchError>>;
}

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

/// Scrapes the NIC Argentina "verificar dominio" form.
pub struct NicArClient {
    http: reqwest::Client,
    base_url: Url,
    verify_url: Url,
}

impl NicArClient {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid registry base URL: {}", config.base_url))?;
        let verify_url = base_url
            .join("verificar-dominio")
            .context("Cannot build registry verification URL")?;

        let http = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(config.user_agent.clone())
            .build()
            .context("Failed to build registry HTTP client")?;

        Ok(Self {
            http,
            base_url,
            verify_url,
        })
    }

    async fn fetch_page(&self, key: &DomainKey, timeout: Duration) -> Result<String, FetchError> {
        // The landing page hands out the session cookies the form expects.
        self.http
            .get(self.base_url.clone())
            .timeout(timeout)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| classify_transport_error(e, timeout))?;

        let form = [
            ("txtBuscar", key.label()),
            ("cmbZonas", key.zone().as_str()),
            ("btn-consultar", "Buscar"),
        ];

        let response = self
            .http
            .post(self.verify_url.clone())
            .timeout(timeout)
            .header(ACCEPT, ACCEPT_HTML)
            .header(REFERER, self.base_url.as_str())
            .form(&form)
            .send()
            .await
            .map_err(|e| classify_transport_error(e, timeout))?;

        let status = response.status();
        if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::InvalidDomain(format!(
                "registry answered {} for {}",
                status, key
            )));
        }
        if !status.is_success() {
            return Err(FetchError::Unreachable(format!("registry answered {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| classify_transport_error(e, timeout))
    }
}

impl RegistryClient for NicArClient {
    fn lookup<'a>(
        &'a self,
        key: &'a DomainKey,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<LookupResult, FetchError>> {
        async move {
            tracing::info!("Querying registry for {}", key);
            let html = self.fetch_page(key, timeout).await?;
            let availability = parser::parse_page(&html).inspect_err(|e| {
                tracing::warn!("Could not classify registry page for {}: {}", key, e);
            })?;
            tracing::info!("Registry reports {} as {}", key, availability.status());
            Ok(LookupResult::new(availability, Utc::now()))
        }
        .boxed()
    }
}

fn classify_transport_error(e: reqwest::Error, timeout: Duration) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        FetchError::Unreachable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Zone;
    use crate::models::Availability;
    use axum::{Form, Router, http::StatusCode as HttpStatus, response::IntoResponse, routing::get};
    use std::collections::HashMap;

    const AVAILABLE_PAGE: &str = include_str!("../../tests/fixtures/available.html");
    const REGISTERED_PAGE: &str = include_str!("../../tests/fixtures/registered.html");

    async fn verify(Form(form): Form<HashMap<String, String>>) -> impl IntoResponse {
        match form.get("txtBuscar").map(String::as_str) {
            Some("google") => (HttpStatus::OK, REGISTERED_PAGE).into_response(),
            Some("rechazado") => (HttpStatus::BAD_REQUEST, "").into_response(),
            Some("lento") => {
                tokio::time::sleep(Duration::from_secs(5)).await;
                (HttpStatus::OK, AVAILABLE_PAGE).into_response()
            }
            _ => (HttpStatus::OK, AVAILABLE_PAGE).into_response(),
        }
    }

    async fn fake_registry() -> anyhow::Result<NicArClient> {
        let app = Router::new()
            .route("/", get(|| async { "NIC Argentina" }))
            .route("/verificar-dominio", axum::routing::post(verify));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        NicArClient::new(&RegistryConfig {
            base_url: format!("http://{}/", addr),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_lookup_registered_and_available() -> anyhow::Result<()> {
        let client = fake_registry().await?;
        let timeout = Duration::from_secs(5);

        let key = DomainKey::new("google", Zone::ComAr)?;
        let result = client.lookup(&key, timeout).await?;
        assert!(result.is_registered());

        let key = DomainKey::new("nonexistent-xyz", Zone::OrgAr)?;
        let result = client.lookup(&key, timeout).await?;
        assert_eq!(result.availability, Availability::Available);

        Ok(())
    }

    #[tokio::test]
    async fn test_lookup_error_classification() -> anyhow::Result<()> {
        let client = fake_registry().await?;

        let key = DomainKey::new("rechazado", Zone::ComAr)?;
        let err = client.lookup(&key, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidDomain(_)));

        let key = DomainKey::new("lento", Zone::ComAr)?;
        let err = client
            .lookup(&key, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err, FetchError::Timeout(Duration::from_millis(200)));

        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_registry() -> anyhow::Result<()> {
        // Bind and drop to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        drop(listener);

        let client = NicArClient::new(&RegistryConfig {
            base_url: format!("http://{}/", addr),
            ..Default::default()
        })?;
        let key = DomainKey::new("google", Zone::ComAr)?;
        let err = client.lookup(&key, Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err, FetchError::Unreachable(_)));

        Ok(())
    }
}
