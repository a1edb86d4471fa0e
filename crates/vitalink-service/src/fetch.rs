//! Outbound HTTP used by the scrapers.
//!
//! Everything that talks to Amazon or YouTube goes through [`PageFetcher`] so
//! the extraction logic can be exercised against canned pages.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
    Client, StatusCode,
    header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderValue},
    redirect::Policy,
};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const BROWSER_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
const MAX_REDIRECTS: usize = 10;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request to {url} returned {status}")]
    Status { url: String, status: StatusCode },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait PageFetcher: Send + Sync + 'static {
    async fn get_text(&self, url: &str) -> Result<String, FetchError>;

    async fn get_bytes(&self, url: &str) -> Result<FetchedBody, FetchError>;

    /// Follows redirects with a HEAD request and returns the final URL.
    async fn resolve_redirects(&self, url: &str) -> Result<String, FetchError>;
}

#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE),
        );

        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client })
    }

    async fn send_get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        check_status(url, response)
    }
}

fn check_status(url: &str, response: reqwest::Response) -> Result<reqwest::Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(FetchError::Status {
            url: url.to_string(),
            status,
        })
    }
}

#[async_trait]
impl PageFetcher for ReqwestFetcher {
    #[instrument(skip(self))]
    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.send_get(url).await?;
        let text = response
            .text()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;
        debug!(bytes = text.len(), "Fetched page");
        Ok(text)
    }

    #[instrument(skip(self))]
    async fn get_bytes(&self, url: &str) -> Result<FetchedBody, FetchError> {
        let response = self.send_get(url).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;
        debug!(bytes = bytes.len(), content_type = ?content_type, "Fetched binary body");
        Ok(FetchedBody {
            bytes,
            content_type,
        })
    }

    #[instrument(skip(self))]
    async fn resolve_redirects(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;
        let response = check_status(url, response)?;
        let resolved = response.url().to_string();
        debug!(resolved = %resolved, "Resolved redirects");
        Ok(resolved)
    }
}
