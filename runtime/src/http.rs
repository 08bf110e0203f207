//! Gateway HTTP dispatcher.
//!
//! Posts the request payload as JSON to the gateway, which routes it to the
//! provider named in the `X-HIP-ID` header. The gateway answers the immediate
//! call with `202 Accepted`; the actual answer arrives later as a callback.

use crate::config::GatewayConfig;
use callback_correlation_core::{CorrelationKey, Destination, OutboundDispatcher, SendError};
use futures::future::BoxFuture;
use reqwest::Client;
use serde::Serialize;

/// Gateway path for care-context discovery requests.
pub const DISCOVER_PATH: &str = "/v0.5/care-contexts/discover";

/// Header naming the provider the gateway should route to.
pub const PROVIDER_HEADER: &str = "X-HIP-ID";

/// Header carrying this client's registry id.
pub const CLIENT_HEADER: &str = "X-CM-ID";

/// [`OutboundDispatcher`] backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpDispatcher {
    http_client: Client,
    url: String,
    client_id: Option<String>,
}

impl HttpDispatcher {
    /// Create a dispatcher posting to [`DISCOVER_PATH`] under the gateway base URL.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &GatewayConfig) -> Result<Self, SendError> {
        Self::with_path(config, DISCOVER_PATH)
    }

    /// Create a dispatcher posting to `path` under the gateway base URL.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Transport`] if the HTTP client cannot be built.
    pub fn with_path(config: &GatewayConfig, path: &str) -> Result<Self, SendError> {
        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SendError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            url: format!("{}{path}", config.base_url),
            client_id: config.client_id.clone(),
        })
    }

    /// Full URL requests are posted to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl<Q: Serialize + Sync> OutboundDispatcher<Q> for HttpDispatcher {
    fn send<'a>(
        &'a self,
        key: &'a CorrelationKey,
        payload: &'a Q,
        destination: &'a Destination,
    ) -> BoxFuture<'a, Result<(), SendError>> {
        Box::pin(async move {
            if destination.as_str().trim().is_empty() {
                return Err(SendError::InvalidDestination(
                    "destination id is blank".to_string(),
                ));
            }

            let body =
                serde_json::to_vec(payload).map_err(|e| SendError::Serialization(e.to_string()))?;

            let mut request = self
                .http_client
                .post(&self.url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .header(PROVIDER_HEADER, destination.as_str())
                .body(body);
            if let Some(client_id) = &self.client_id {
                request = request.header(CLIENT_HEADER, client_id);
            }

            let response = request.send().await.map_err(|e| {
                tracing::error!(correlation_key = %key, error = %e, "Gateway request failed");
                SendError::Transport(e.to_string())
            })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                tracing::error!(
                    correlation_key = %key,
                    status = status.as_u16(),
                    body = %body,
                    "Gateway rejected request"
                );
                return Err(SendError::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }

            tracing::debug!(correlation_key = %key, destination = %destination, "Request accepted by gateway");
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn posts_payload_with_routing_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DISCOVER_PATH))
            .and(header(PROVIDER_HEADER, "hip-1"))
            .and(header(CLIENT_HEADER, "ncg"))
            .and(body_json(json!({ "requestId": "R1" })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let config = GatewayConfig::new(server.uri()).with_client_id("ncg");
        let dispatcher = HttpDispatcher::new(&config).unwrap();

        dispatcher
            .send(
                &CorrelationKey::new("R1"),
                &json!({ "requestId": "R1" }),
                &Destination::new("hip-1"),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("gateway down"))
            .mount(&server)
            .await;

        let dispatcher = HttpDispatcher::new(&GatewayConfig::new(server.uri())).unwrap();
        let err = dispatcher
            .send(&CorrelationKey::new("R1"), &json!({}), &Destination::new("hip-1"))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            SendError::Rejected {
                status: 500,
                body: "gateway down".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn slow_gateway_is_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let config = GatewayConfig::new(server.uri()).with_request_timeout(Duration::from_millis(100));
        let dispatcher = HttpDispatcher::new(&config).unwrap();
        let err = dispatcher
            .send(&CorrelationKey::new("R1"), &json!({}), &Destination::new("hip-1"))
            .await
            .unwrap_err();

        assert!(matches!(err, SendError::Transport(_)));
    }

    #[tokio::test]
    async fn blank_destination_is_refused_before_sending() {
        let dispatcher = HttpDispatcher::new(&GatewayConfig::new("http://127.0.0.1:9")).unwrap();
        let err = dispatcher
            .send(&CorrelationKey::new("R1"), &json!({}), &Destination::new(" "))
            .await
            .unwrap_err();

        assert!(matches!(err, SendError::InvalidDestination(_)));
    }
}
