use crate::http_client::{post_serialized, HttpClient, HttpClientError};
use crate::models::{ProcessorId, ServiceHealth};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("{processor} processor unreachable: {source}")]
    Transport {
        processor: ProcessorId,
        #[source]
        source: HttpClientError,
    },
    #[error("{processor} processor answered with status {status}")]
    Status { processor: ProcessorId, status: u16 },
    #[error("{processor} processor sent an unreadable health report: {source}")]
    Decode {
        processor: ProcessorId,
        #[source]
        source: serde_json::Error,
    },
    #[error("{processor} processor did not answer within {timeout_ms}ms")]
    Timeout { processor: ProcessorId, timeout_ms: u128 },
}

#[derive(Debug, Serialize)]
struct ProcessorPaymentRequest<'a> {
    #[serde(rename = "correlationId")]
    correlation_id: &'a str,
    amount: f64,
    #[serde(rename = "requestedAt")]
    requested_at: String,
}

/// Client for one downstream payment processor.
#[derive(Clone)]
pub struct ProcessorClient {
    id: ProcessorId,
    base_url: String,
    http_client: Arc<dyn HttpClient>,
}

impl ProcessorClient {
    pub fn new(id: ProcessorId, base_url: impl Into<String>, http_client: Arc<dyn HttpClient>) -> Self {
        let base_url: String = base_url.into();
        Self {
            id,
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        }
    }

    pub fn id(&self) -> ProcessorId {
        self.id
    }

    pub fn payments_url(&self) -> String {
        format!("{}/payments", self.base_url)
    }

    pub fn health_url(&self) -> String {
        format!("{}/payments/service-health", self.base_url)
    }

    pub async fn get_health(&self) -> Result<ServiceHealth, ProcessorError> {
        let response = self
            .http_client
            .get(&self.health_url())
            .await
            .map_err(|source| ProcessorError::Transport {
                processor: self.id,
                source,
            })?;

        if response.status_code() != 200 {
            return Err(ProcessorError::Status {
                processor: self.id,
                status: response.status_code(),
            });
        }

        response
            .json::<ServiceHealth>()
            .map_err(|source| ProcessorError::Decode {
                processor: self.id,
                source,
            })
    }

    /// Submits a payment. Only HTTP 200 counts as acceptance.
    pub async fn post_payment(
        &self,
        correlation_id: &str,
        amount: f64,
        requested_at: DateTime<Utc>,
    ) -> Result<(), ProcessorError> {
        let payload = ProcessorPaymentRequest {
            correlation_id,
            amount,
            requested_at: requested_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        };

        let response = post_serialized(self.http_client.as_ref(), &self.payments_url(), &payload)
            .await
            .map_err(|source| ProcessorError::Transport {
                processor: self.id,
                source,
            })?;

        if response.status_code() == 200 {
            Ok(())
        } else {
            Err(ProcessorError::Status {
                processor: self.id,
                status: response.status_code(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::MockHttpClient;
    use chrono::TimeZone;

    fn client_with(mock: MockHttpClient) -> (ProcessorClient, Arc<MockHttpClient>) {
        let mock = Arc::new(mock);
        let client = ProcessorClient::new(ProcessorId::Default, "http://default.example.com/", mock.clone());
        (client, mock)
    }

    #[tokio::test]
    async fn test_get_health_success() {
        let (client, _) = client_with(MockHttpClient::new().with_response(
            "http://default.example.com/payments/service-health",
            200,
            r#"{"failing": false, "minResponseTime": 150}"#,
        ));

        let health = client.get_health().await.unwrap();
        assert_eq!(health, ServiceHealth::new(false, 150));
    }

    #[tokio::test]
    async fn test_get_health_rate_limited() {
        let (client, _) = client_with(MockHttpClient::new().with_response(
            "http://default.example.com/payments/service-health",
            429,
            "Too Many Requests",
        ));

        let result = client.get_health().await;
        assert!(matches!(result, Err(ProcessorError::Status { status: 429, .. })));
    }

    #[tokio::test]
    async fn test_get_health_invalid_json() {
        let (client, _) = client_with(MockHttpClient::new().with_response(
            "http://default.example.com/payments/service-health",
            200,
            "invalid json",
        ));

        let result = client.get_health().await;
        assert!(matches!(result, Err(ProcessorError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_post_payment_sends_processor_payload() {
        let (client, mock) = client_with(MockHttpClient::new().with_response(
            "http://default.example.com/payments",
            200,
            r#"{"message": "payment processed successfully"}"#,
        ));
        let requested_at = Utc.with_ymd_and_hms(2025, 7, 10, 12, 0, 0).unwrap();

        client.post_payment("a1", 19.9, requested_at).await.unwrap();

        let bodies = mock.posted_bodies("http://default.example.com/payments");
        assert_eq!(bodies.len(), 1);
        let sent: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
        assert_eq!(sent["correlationId"], "a1");
        assert_eq!(sent["amount"], 19.9);
        assert_eq!(sent["requestedAt"], "2025-07-10T12:00:00Z");
    }

    #[tokio::test]
    async fn test_post_payment_non_200_is_failure() {
        let (client, _) = client_with(MockHttpClient::new().with_response(
            "http://default.example.com/payments",
            201,
            "",
        ));

        let result = client.post_payment("a1", 10.0, Utc::now()).await;
        assert!(matches!(result, Err(ProcessorError::Status { status: 201, .. })));
    }
}
