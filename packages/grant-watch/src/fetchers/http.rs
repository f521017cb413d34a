//! HTTP fetcher backed by reqwest.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::CrawlConfig;
use crate::error::{FetchError, FetchResult};
use crate::traits::fetcher::{FetchedPage, PageFetcher};

/// Fetches pages over HTTP(S).
///
/// Redirects are followed; the final URL is reported back so relative
/// links resolve against the page that was actually served.
pub struct HttpFetcher {
    client: reqwest::Client,
    user_agent: String,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(&CrawlConfig::default())
    }
}

impl HttpFetcher {
    /// Create a fetcher using the crawl config's user agent and timeout.
    pub fn new(config: &CrawlConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(config.request_timeout())
                .build()
                .expect("Failed to create HTTP client"),
            user_agent: config.user_agent.clone(),
        }
    }

    /// Set a custom HTTP client.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Set a custom user agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> FetchResult<FetchedPage> {
        let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl {
            url: url.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
            });
        }

        debug!(url = %url, "HTTP fetch starting");
        let response = self
            .client
            .get(parsed)
            .header("User-Agent", &self.user_agent)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "es-ES,es;q=0.9,en;q=0.8")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "HTTP fetch returned error status");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Capture final URL after redirects
        let final_url = response.url().to_string();
        let body = response.text().await.map_err(|e| classify(url, e))?;

        debug!(url = %url, final_url = %final_url, bytes = body.len(), "HTTP fetch complete");

        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            body,
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn classify(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        warn!(url = %url, "HTTP request timed out");
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        warn!(url = %url, error = %error, "HTTP request failed");
        FetchError::Http {
            url: url.to_string(),
            source: Box::new(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_fetch_success_sends_user_agent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/becas"))
            .and(header("User-Agent", "GrantWatchTest/0.1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<h1>Becas</h1>"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::default().with_user_agent("GrantWatchTest/0.1");
        let page = fetcher
            .fetch(&format!("{}/becas", server.uri()), TIMEOUT)
            .await
            .unwrap();

        assert_eq!(page.status, 200);
        assert_eq!(page.body, "<h1>Becas</h1>");
        assert!(page.url.ends_with("/becas"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::default();

        let err = fetcher
            .fetch(&format!("{}/missing", server.uri()), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
        assert!(!err.is_retryable());

        let err = fetcher
            .fetch(&format!("{}/broken", server.uri()), TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<p>late</p>")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let err = HttpFetcher::default()
            .fetch(&server.uri(), Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_invalid_urls() {
        let fetcher = HttpFetcher::default();

        let err = fetcher.fetch("not a url", TIMEOUT).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));

        let err = fetcher
            .fetch("ftp://example.com/file", TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }
}
