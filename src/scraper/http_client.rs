use crate::config::ScraperConfig;
use crate::scraper::{Page, PageFetcher};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },
}

impl FetchError {
    /// Transport errors, 429 and 5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Client(_) => false,
            FetchError::Request { .. } => true,
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

pub struct HttpClient {
    inner: reqwest::Client,
    config: ScraperConfig,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self, FetchError> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Session cookies are needed for organizer profile pages
            .cookie_store(true)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    async fn get_once(&self, url: &str) -> Result<Page, FetchError> {
        self.polite_delay().await;
        debug!("GET {}", url);

        let resp = self.inner.get(url).send().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;

        let status = resp.status();
        if !status.is_success() {
            let err = FetchError::Status { url: url.to_string(), status: status.as_u16() };
            if err.is_retryable() {
                warn!("{}, will retry", err);
            }
            return Err(err);
        }

        let final_url = resp.url().to_string();
        let html = resp.text().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;

        Ok(Page { url: final_url, html })
    }

    /// Sleep for the configured delay + random jitter.
    async fn polite_delay(&self) {
        let jitter_ms = rand::random_range(0..=self.config.jitter_ms);
        sleep(Duration::from_millis(self.config.request_delay_ms + jitter_ms)).await;
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.config.request_delay_ms.max(1))
            .max_delay(Duration::from_secs(30))
            .map(jitter)
            .take(self.config.max_retries as usize);

        RetryIf::start(strategy, || self.get_once(url), FetchError::is_retryable).await
    }
}
