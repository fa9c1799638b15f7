use async_trait::async_trait;

use crate::error::Result;

/// Outbound page fetch: absolute URL in, HTML text out.
///
/// Implementations decide how the page is obtained (plain HTTP, a headless
/// browser, canned fixtures in tests).
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the page at `url` and return its markup.
    async fn fetch(&self, url: &str) -> Result<String>;

    /// Name used in logs
    fn source_name(&self) -> &'static str;
}
