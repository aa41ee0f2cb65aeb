//! HTTP transport for rill sessions.
//!
//! Issues a GET and pushes the response body into the session chunk by chunk
//! as it arrives. The request runs on the ambient tokio runtime; stopping the
//! transport aborts it.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, RequestBuilder};
use rill_core::config::HttpConfig;
use rill_core::{pump, Delivery, StreamError, StreamResult, Transport, TransportError, TransportHandle};
use tokio::task::AbortHandle;
use tracing::{debug, warn};
use url::Url;

const DEFAULT_ACCEPT: &str = "text/event-stream";

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    url: Url,
    headers: HeaderMap,
}

impl HttpTransport {
    pub fn new(url: &str) -> Result<Self> {
        Self::build(url, None)
    }

    /// Build from the `[http]` config section. The URL is required.
    pub fn from_config(config: &HttpConfig) -> Result<Self> {
        let url = config.url.as_deref().context("No stream URL configured")?;
        let mut transport = Self::build(url, config.connect_timeout_secs)?;
        transport = transport.with_header(ACCEPT.as_str(), &config.accept)?;
        for (name, value) in &config.headers {
            transport = transport.with_header(name, value)?;
        }
        Ok(transport)
    }

    /// Add (or replace) a request header.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .with_context(|| format!("Invalid header name: {}", name))?;
        let value = HeaderValue::from_str(value)
            .with_context(|| format!("Invalid value for header {}", name))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn build(url: &str, connect_timeout_secs: Option<u64>) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("Invalid stream URL: {}", url))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("Unsupported URL scheme: {}", url.scheme());
        }

        let mut builder = Client::builder();
        if let Some(secs) = connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));

        Ok(Self {
            client,
            url,
            headers,
        })
    }
}

impl Transport for HttpTransport {
    fn open(&self, delivery: Delivery) -> StreamResult<Box<dyn TransportHandle>> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            StreamError::from(TransportError::Other(format!("no tokio runtime: {}", e)))
        })?;

        let request = self
            .client
            .get(self.url.clone())
            .headers(self.headers.clone());
        let task = runtime.spawn(fetch(request, self.url.clone(), delivery));

        Ok(Box::new(HttpHandle {
            abort: task.abort_handle(),
        }))
    }
}

struct HttpHandle {
    abort: AbortHandle,
}

impl TransportHandle for HttpHandle {
    fn stop(&self) {
        self.abort.abort();
    }
}

#[tracing::instrument(skip_all, fields(url = %url))]
async fn fetch(request: RequestBuilder, url: Url, delivery: Delivery) {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            warn!("Request failed: {}", e);
            delivery.fail(TransportError::Network(e.to_string()));
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), "Stream request rejected");
        delivery.fail(TransportError::Status {
            status: status.as_u16(),
            body,
        });
        return;
    }

    debug!(status = status.as_u16(), "Streaming response body");
    pump(response.bytes_stream(), delivery).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_new_sets_default_accept() {
        let transport = HttpTransport::new("http://localhost:8000/api/stream_test").unwrap();
        assert_eq!(transport.url().path(), "/api/stream_test");
        assert_eq!(transport.headers.get(ACCEPT).unwrap(), DEFAULT_ACCEPT);
    }

    #[test]
    fn test_rejects_bad_urls() {
        assert!(HttpTransport::new("not a url").is_err());
        assert!(HttpTransport::new("ftp://example.com/stream").is_err());
    }

    #[test]
    fn test_from_config() {
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), "Bearer t0ken".to_string());
        let config = HttpConfig {
            url: Some("https://example.com/events".into()),
            accept: "application/x-ndjson".into(),
            headers,
            connect_timeout_secs: Some(1),
        };

        let transport = HttpTransport::from_config(&config).unwrap();
        assert_eq!(transport.headers.get(ACCEPT).unwrap(), "application/x-ndjson");
        assert_eq!(transport.headers.get("authorization").unwrap(), "Bearer t0ken");
    }

    #[test]
    fn test_from_config_requires_url() {
        assert!(HttpTransport::from_config(&HttpConfig::default()).is_err());
    }

    #[test]
    fn test_invalid_header_rejected() {
        let transport = HttpTransport::new("http://localhost/").unwrap();
        assert!(transport.clone().with_header("bad header", "x").is_err());
        assert!(transport.with_header("X-Ok", "line\nbreak").is_err());
    }
}
