//! Site fetching for scrape tasks.
//!
//! Tasks reach target sites through the narrow `SiteFetcher` trait;
//! `HttpFetcher` is the real reqwest-backed implementation. Every fetch
//! carries its own timeout so one unresponsive site cannot stall a job.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

use crate::config::ScrapingConfig;

/// Errors from fetching a single target site. Always a per-item failure
/// from the job's point of view.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("unsupported content type: {0}")]
    ContentType(String),
    #[error("request error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A successfully fetched page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub final_url: Url,
    pub status: u16,
    pub content_type: String,
    pub body: String,
    pub duration: Duration,
}

/// Narrow fetch interface a task depends on; tests substitute stubs.
#[async_trait]
pub trait SiteFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;
}

/// reqwest-backed fetcher with a shared connection pool.
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(config: &ScrapingConfig) -> Result<Self, FetchError> {
        let timeout = Duration::from_secs(config.request_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(&config.user_agent)
            .gzip(true)
            .build()?;
        Ok(Self { client, timeout })
    }
}

#[async_trait]
impl SiteFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        let start = Instant::now();

        let response = self.client.get(url.as_str()).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();

        if !content_type.contains("text/html")
            && !content_type.contains("application/xhtml")
            && !content_type.contains("text/plain")
        {
            return Err(FetchError::ContentType(content_type));
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout)
            } else {
                FetchError::Http(e)
            }
        })?;

        Ok(FetchedPage {
            final_url,
            status: status.as_u16(),
            content_type,
            body,
            duration: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> ScrapingConfig {
        ScrapingConfig {
            request_timeout_secs: 2,
            connect_timeout_secs: 2,
            ..ScrapingConfig::default()
        }
    }

    #[tokio::test]
    async fn fetches_html_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/shop"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<html><title>Fly Shop</title></html>")
                    .insert_header("content-type", "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&test_config()).unwrap();
        let url = Url::parse(&format!("{}/shop", server.uri())).unwrap();
        let page = fetcher.fetch(&url).await.unwrap();
        assert_eq!(page.status, 200);
        assert!(page.body.contains("Fly Shop"));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/blocked"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&test_config()).unwrap();
        let url = Url::parse(&format!("{}/blocked", server.uri())).unwrap();
        match fetcher.fetch(&url).await {
            Err(FetchError::Status(403)) => {}
            other => panic!("expected 403 status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn binary_content_type_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/catalog.pdf"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0u8; 16])
                    .insert_header("content-type", "application/pdf"),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(&test_config()).unwrap();
        let url = Url::parse(&format!("{}/catalog.pdf", server.uri())).unwrap();
        assert!(matches!(
            fetcher.fetch(&url).await,
            Err(FetchError::ContentType(_))
        ));
    }
}
