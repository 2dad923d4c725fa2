//! Page transport.
//!
//! Every request is issued once; a non-200 answer is reported as an error
//! and the caller decides whether that skips a page or a product.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;

use crate::config::Config;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("request failed ({url}): {error}")]
    Request { url: String, error: reqwest::Error },
    #[error("unexpected status {status} ({url})")]
    Status { url: String, status: u16 },
    #[error("failed to read body ({url}): {error}")]
    Body { url: String, error: reqwest::Error },
}

/// Something that turns a URL into page text.
pub trait PageSource: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.marketplace.user_agent)
            .timeout(Duration::from_secs(config.http.timeout_secs))
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

impl PageSource for HttpSource {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "text/html")
            .send()
            .await
            .map_err(|error| FetchError::Request {
                url: url.to_owned(),
                error,
            })?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }
        let body = response.text().await.map_err(|error| FetchError::Body {
            url: url.to_owned(),
            error,
        })?;
        debug!(url, bytes = body.len(), "page fetched");
        Ok(body)
    }
}
