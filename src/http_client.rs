use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("connection refused by {0}")]
    Unreachable(String),
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, HttpClientError>;

    async fn post_json(&self, url: &str, body: String) -> Result<HttpResponse, HttpClientError>;
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status_code: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }
}

/// Serializes `body` and posts it through any [`HttpClient`].
pub async fn post_serialized<T: Serialize + ?Sized>(
    client: &dyn HttpClient,
    url: &str,
    body: &T,
) -> Result<HttpResponse, HttpClientError> {
    let body = serde_json::to_string(body)?;
    client.post_json(url, body).await
}

pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(64)
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, HttpClientError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        Ok(HttpResponse {
            status_code: status.as_u16(),
            body,
        })
    }

    async fn post_json(&self, url: &str, body: String) -> Result<HttpResponse, HttpClientError> {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;

        Ok(HttpResponse {
            status_code: status.as_u16(),
            body,
        })
    }
}

#[derive(Clone)]
pub struct MockHttpResponse {
    pub status_code: u16,
    pub body: String,
    pub delay: Option<Duration>,
    pub unreachable: bool,
}

/// In-process stand-in for a processor's HTTP API. Responses are keyed by URL and can be
/// swapped while a test is running; every call is recorded.
pub struct MockHttpClient {
    responses: Mutex<HashMap<String, MockHttpResponse>>,
    default_response: MockHttpResponse,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            default_response: MockHttpResponse {
                status_code: 404,
                body: "Not Found".to_string(),
                delay: None,
                unreachable: false,
            },
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(self, url: &str, status_code: u16, body: &str) -> Self {
        self.set_response(url, status_code, body);
        self
    }

    pub fn with_default_response(mut self, status_code: u16, body: &str) -> Self {
        self.default_response = MockHttpResponse {
            status_code,
            body: body.to_string(),
            delay: None,
            unreachable: false,
        };
        self
    }

    /// Answers `url` only after `delay` has passed.
    pub fn with_delay(self, url: &str, status_code: u16, body: &str, delay: Duration) -> Self {
        self.insert(
            url,
            MockHttpResponse {
                status_code,
                body: body.to_string(),
                delay: Some(delay),
                unreachable: false,
            },
        );
        self
    }

    /// Fails every call to `url` at the transport level.
    pub fn with_unreachable(self, url: &str) -> Self {
        self.insert(
            url,
            MockHttpResponse {
                status_code: 0,
                body: String::new(),
                delay: None,
                unreachable: true,
            },
        );
        self
    }

    pub fn set_response(&self, url: &str, status_code: u16, body: &str) {
        self.insert(
            url,
            MockHttpResponse {
                status_code,
                body: body.to_string(),
                delay: None,
                unreachable: false,
            },
        );
    }

    fn insert(&self, url: &str, response: MockHttpResponse) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(url.to_string(), response);
        }
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls
            .lock()
            .map(|calls| calls.iter().filter(|(called, _)| called == url).count())
            .unwrap_or(0)
    }

    /// Bodies posted to `url`, oldest first.
    pub fn posted_bodies(&self, url: &str) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| {
                calls
                    .iter()
                    .filter(|(called, _)| called == url)
                    .filter_map(|(_, body)| body.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    async fn respond(
        &self,
        url: &str,
        body: Option<String>,
    ) -> Result<HttpResponse, HttpClientError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((url.to_string(), body));
        }

        let mock_response = self
            .responses
            .lock()
            .ok()
            .and_then(|responses| responses.get(url).cloned())
            .unwrap_or_else(|| self.default_response.clone());

        if let Some(delay) = mock_response.delay {
            tokio::time::sleep(delay).await;
        }

        if mock_response.unreachable {
            return Err(HttpClientError::Unreachable(url.to_string()));
        }

        Ok(HttpResponse {
            status_code: mock_response.status_code,
            body: mock_response.body,
        })
    }
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, HttpClientError> {
        self.respond(url, None).await
    }

    async fn post_json(&self, url: &str, body: String) -> Result<HttpResponse, HttpClientError> {
        self.respond(url, Some(body)).await
    }
}
