use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use crate::error::{CheckError, FetchError};
use crate::models::DomainResponse;
use crate::service::QueryService;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub struct ApiServer {
    state: AppState,
}

#[derive(Clone)]
struct AppState {
    service: Arc<QueryService>,
    history_limit: u32,
}

#[derive(Deserialize)]
struct CheckParams {
    zone: Option<String>,
}

#[derive(Serialize)]
struct ServiceInfo {
    name: &'static str,
    version: &'static str,
    endpoints: Vec<EndpointInfo>,
}

#[derive(Serialize)]
struct EndpointInfo {
    path: &'static str,
    method: &'static str,
    description: &'static str,
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

struct ApiError(CheckError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CheckError::Validation(_) => StatusCode::BAD_REQUEST,
            CheckError::Fetch(FetchError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            CheckError::Fetch(FetchError::InvalidDomain(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            CheckError::Fetch(_) => StatusCode::BAD_GATEWAY,
        };
        let body = ErrorBody {
            detail: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl ApiServer {
    pub fn new(service: Arc<QueryService>, history_limit: u32) -> Self {
        Self {
            state: AppState {
                service,
                history_limit,
            },
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(index))
            .route("/check/:domain", get(check))
            .route("/history", get(history))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Serves until `shutdown` is cancelled, then drains open requests.
    pub async fn run(self, listen: &str, shutdown: CancellationToken) -> Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(listen).await?;
        tracing::info!("Domain checker listening on http://{}", listener.local_addr()?);
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        Ok(())
    }
}

async fn index() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: "NIC.ar Domain Checker API",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: vec![
            EndpointInfo {
                path: "/check/{domain}",
                method: "GET",
                description: "Check whether a domain is registered",
            },
            EndpointInfo {
                path: "/history",
                method: "GET",
                description: "Most recent lookups, newest first",
            },
        ],
    })
}

async fn check(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(params): Query<CheckParams>,
) -> Result<Json<DomainResponse>, ApiError> {
    let outcome = state
        .service
        .check_domain(&domain, params.zone.as_deref())
        .await
        .map_err(|e| {
            tracing::warn!("Check for '{}' failed: {}", domain, e);
            ApiError(e)
        })?;

    Ok(Json(DomainResponse::new(&outcome.key, &outcome.result)))
}

async fn history(State(state): State<AppState>) -> Json<Vec<DomainResponse>> {
    let records = state.service.history(state.history_limit).await;
    Json(records.iter().map(DomainResponse::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryClient;
    use crate::registry::testing::ScriptedClient;
    use crate::service::ServiceSettings;
    use crate::state::ResultStore;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    struct TestServer {
        base: String,
        shutdown: CancellationToken,
        _tmp: NamedTempFile,
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.shutdown.cancel();
        }
    }

    async fn spawn_server(client: Arc<dyn RegistryClient>) -> anyhow::Result<TestServer> {
        let tmp = NamedTempFile::new()?;
        let store = Arc::new(ResultStore::open(tmp.path()).await?);
        let settings = ServiceSettings {
            freshness: Duration::from_secs(3600),
            fetch_timeout: Duration::from_secs(5),
            refresh_ahead: None,
        };
        let service = Arc::new(QueryService::new(store, client, settings));
        let app = ApiServer::new(service, 100).router();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let base = format!("http://{}", listener.local_addr()?);
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
        });

        Ok(TestServer {
            base,
            shutdown,
            _tmp: tmp,
        })
    }

    #[tokio::test]
    async fn test_check_registered_domain() -> anyhow::Result<()> {
        let server = spawn_server(Arc::new(ScriptedClient::registered("Google Argentina S.R.L."))).await?;

        let response = reqwest::get(format!("{}/check/google.com.ar", server.base)).await?;
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        let body: serde_json::Value = response.json().await?;
        assert_eq!(body["domain"], "google");
        assert_eq!(body["zone"], ".com.ar");
        assert_eq!(body["status"], "registered");
        assert_eq!(body["details"]["owner"], "Google Argentina S.R.L.");
        assert!(body["check_date"].is_string());
        Ok(())
    }

    #[tokio::test]
    async fn test_check_available_then_history() -> anyhow::Result<()> {
        let server = spawn_server(Arc::new(ScriptedClient::available())).await?;

        let body: serde_json::Value =
            reqwest::get(format!("{}/check/nonexistent-xyz?zone=.org.ar", server.base))
                .await?
                .json()
                .await?;
        assert_eq!(body["status"], "available");
        assert_eq!(body["details"], serde_json::json!({}));

        let history: Vec<DomainResponse> = reqwest::get(format!("{}/history", server.base))
            .await?
            .json()
            .await?;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].domain, "nonexistent-xyz");
        assert_eq!(history[0].zone, ".org.ar");
        Ok(())
    }

    #[tokio::test]
    async fn test_validation_error_is_client_error() -> anyhow::Result<()> {
        let server = spawn_server(Arc::new(ScriptedClient::available())).await?;

        let response = reqwest::get(format!("{}/check/badzone?zone=.invalid", server.base)).await?;
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json().await?;
        assert!(body["detail"].as_str().unwrap_or_default().contains(".invalid"));
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_errors_are_upstream_errors() -> anyhow::Result<()> {
        let server = spawn_server(Arc::new(ScriptedClient::failing(FetchError::UnparsableResponse(
            "no marker".to_string(),
        ))))
        .await?;
        let response = reqwest::get(format!("{}/check/roto.ar", server.base)).await?;
        assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);

        let server = spawn_server(Arc::new(ScriptedClient::failing(FetchError::Timeout(
            Duration::from_secs(10),
        ))))
        .await?;
        let response = reqwest::get(format!("{}/check/lento.ar", server.base)).await?;
        assert_eq!(response.status(), reqwest::StatusCode::GATEWAY_TIMEOUT);
        Ok(())
    }

    #[tokio::test]
    async fn test_index_metadata() -> anyhow::Result<()> {
        let server = spawn_server(Arc::new(ScriptedClient::available())).await?;

        let body: serde_json::Value = reqwest::get(format!("{}/", server.base)).await?.json().await?;
        assert_eq!(body["name"], "NIC.ar Domain Checker API");
        assert_eq!(body["endpoints"].as_array().map(Vec::len), Some(2));
        Ok(())
    }
}
