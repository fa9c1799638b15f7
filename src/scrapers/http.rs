use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::error::{AppError, Result};
use crate::scrapers::traits::Fetcher;

/// Plain HTTP fetcher
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with the configured user agent and timeout
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        debug!("Fetching URL: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!("{} returned status: {}", url, status);
            return Err(AppError::fetch(url, format!("HTTP status {status}")));
        }

        let html = response
            .text()
            .await
            .map_err(|e| AppError::fetch(url, format!("failed to read body: {e}")))?;
        debug!("Downloaded {} bytes of HTML", html.len());

        Ok(html)
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}
