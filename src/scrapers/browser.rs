use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::scrapers::traits::Fetcher;

/// Fetcher that renders pages in headless Chrome before reading the markup
pub struct BrowserFetcher {
    browser: Browser,
    settle: Duration,
}

impl BrowserFetcher {
    /// Launch a headless browser; `settle` is how long a page gets to finish scripting
    pub fn new(settle: Duration) -> Result<Self> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(true)
            .build()
            .map_err(|e| AppError::Browser(format!("failed to build launch options: {e}")))?;

        let browser = Browser::new(options)
            .map_err(|e| AppError::Browser(format!("failed to launch Chrome: {e}")))?;

        Ok(Self { browser, settle })
    }
}

fn render(browser: &Browser, url: &str, settle: Duration) -> Result<String> {
    let browser_err = |e: anyhow::Error| AppError::fetch(url, e);

    let tab = browser.new_tab().map_err(browser_err)?;
    tab.navigate_to(url).map_err(browser_err)?;
    tab.wait_until_navigated().map_err(browser_err)?;
    thread::sleep(settle);

    let result = tab
        .evaluate("document.documentElement.outerHTML", false)
        .map_err(browser_err)?;
    let html = result
        .value
        .as_ref()
        .and_then(|value| value.as_str())
        .map(String::from)
        .ok_or_else(|| AppError::fetch(url, "page returned no HTML"))?;

    if let Err(e) = tab.close(true) {
        debug!("Failed to close tab for {}: {}", url, e);
    }

    Ok(html)
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        debug!("Rendering URL: {}", url);
        let browser = self.browser.clone();
        let owned_url = url.to_string();
        let settle = self.settle;

        tokio::task::spawn_blocking(move || render(&browser, &owned_url, settle))
            .await
            .map_err(|e| AppError::Browser(format!("render task failed: {e}")))?
    }

    fn source_name(&self) -> &'static str {
        "headless-chrome"
    }
}
