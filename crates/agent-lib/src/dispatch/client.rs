//! HTTP client for the scaling decision endpoint

use super::SignalSink;
use crate::error::DispatchError;
use crate::models::ScalingSignal;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;
use url::Url;

/// Default base address of the decision endpoint
pub const DEFAULT_ENDPOINT: &str = "http://0.0.0.0:2441";

/// Path signals are posted to
pub const STATS_PATH: &str = "/api/stats";

/// Posts scaling signals to `<base>/api/stats`
///
/// A single attempt per signal, with the transport's default timeouts.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: Client,
    url: Url,
}

impl HttpDispatcher {
    /// Create a dispatcher for the given base address
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        let base = Url::parse(base_url).context("Invalid dispatch endpoint URL")?;
        let url = base.join(STATS_PATH).context("Invalid dispatch path")?;

        Ok(Self { client, url })
    }

    /// Full URL signals are posted to
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl SignalSink for HttpDispatcher {
    async fn dispatch(&self, signal: &ScalingSignal) -> Result<(), DispatchError> {
        let body = serde_json::to_vec(signal)?;

        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(service = %signal.service_name, status = %status, "Signal delivered");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DispatchError::Rejected {
            status: status.to_string(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BasedStats, CurrentStats};
    use mockito::Matcher;

    fn api_signal() -> ScalingSignal {
        ScalingSignal {
            service_id: "svc-api".to_string(),
            service_name: "api".to_string(),
            current: CurrentStats {
                cpu_percentage: 45.2,
                memory_percentage: 30.1,
                replicas: 3,
            },
            based: BasedStats {
                cpu_percentage: 70.0,
                memory_percentage: 0.0,
                min: 2,
                max: 10,
            },
        }
    }

    #[test]
    fn test_url_joins_stats_path() {
        let dispatcher = HttpDispatcher::new("http://decider:2441").unwrap();
        assert_eq!(dispatcher.url().as_str(), "http://decider:2441/api/stats");
    }

    #[test]
    fn test_invalid_endpoint() {
        assert!(HttpDispatcher::new("not a url").is_err());
    }

    #[tokio::test]
    async fn test_dispatch_posts_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/stats")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "service_id": "svc-api",
                "service_name": "api",
                "current": {"cpu_percentage": 45.2, "memory_percentage": 30.1, "replicas": 3},
                "based": {"cpu_percentage": 70.0, "memory_percentage": 0.0, "min": 2, "max": 10}
            })))
            .with_status(200)
            .create_async()
            .await;

        let dispatcher = HttpDispatcher::new(&server.url()).unwrap();
        dispatcher.dispatch(&api_signal()).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_dispatch_accepts_any_2xx() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/stats")
            .with_status(204)
            .create_async()
            .await;

        let dispatcher = HttpDispatcher::new(&server.url()).unwrap();
        assert!(dispatcher.dispatch(&api_signal()).await.is_ok());
    }

    #[tokio::test]
    async fn test_dispatch_error_status_carries_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/stats")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let dispatcher = HttpDispatcher::new(&server.url()).unwrap();
        let err = dispatcher.dispatch(&api_signal()).await.unwrap_err();

        match &err {
            DispatchError::Rejected { status, body } => {
                assert!(status.starts_with("503"));
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
        let message = err.to_string();
        assert!(message.contains("503"));
        assert!(message.contains("overloaded"));
    }

    #[tokio::test]
    async fn test_dispatch_redirect_status_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/stats")
            .with_status(304)
            .create_async()
            .await;

        let dispatcher = HttpDispatcher::new(&server.url()).unwrap();
        assert!(dispatcher.dispatch(&api_signal()).await.is_err());
    }

    #[tokio::test]
    async fn test_dispatch_transport_failure() {
        // Port 9 (discard) on localhost is not expected to accept connections
        let dispatcher = HttpDispatcher::new("http://127.0.0.1:9").unwrap();
        let err = dispatcher.dispatch(&api_signal()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
    }
}
