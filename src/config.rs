//! Application configuration.
//!
//! Loaded from a TOML file; every section and field has a default so an
//! empty or missing file yields a working setup.

use std::fs;
use std::path::Path;
use std::time::Duration;

use regex::Regex;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::error::{AppError, Result};
use crate::scrapers::types::SearchParams;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub poll: PollConfig,

    #[serde(default)]
    pub selectors: SelectorConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::config("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::config("http.timeout_secs must be > 0"));
        }
        Url::parse(&self.source.host_url)?;
        if let Some(proxy) = &self.source.proxy_url {
            Url::parse(proxy)?;
        }
        if let FailurePolicyKind::Backoff = self.poll.failure_policy {
            if self.poll.backoff_initial_secs == 0 {
                return Err(AppError::config("poll.backoff_initial_secs must be > 0"));
            }
            if self.poll.backoff_max_secs < self.poll.backoff_initial_secs {
                return Err(AppError::config(
                    "poll.backoff_max_secs must be >= poll.backoff_initial_secs",
                ));
            }
        }
        self.selectors.compile()?;
        Ok(())
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Where listings come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Site root that relative pagination links resolve against
    #[serde(default = "defaults::host_url")]
    pub host_url: String,

    /// Optional pass-through proxy; requests go to `{proxy}/{absolute url}`
    #[serde(default)]
    pub proxy_url: Option<String>,

    /// Explicit first page, overriding `search`
    #[serde(default)]
    pub start_path: Option<String>,

    #[serde(default)]
    pub search: SearchParams,
}

impl SourceConfig {
    /// Path of the first results page.
    pub fn start_path(&self) -> String {
        self.start_path
            .clone()
            .unwrap_or_else(|| self.search.start_path())
    }

    /// Absolute URL to request for a site-relative (or absolute) page path.
    pub fn request_url(&self, page: &str) -> Result<String> {
        let absolute = Url::parse(&self.host_url)?.join(page)?;
        Ok(match &self.proxy_url {
            Some(proxy) => format!("{}/{}", proxy.trim_end_matches('/'), absolute),
            None => absolute.to_string(),
        })
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            host_url: defaults::host_url(),
            proxy_url: None,
            start_path: None,
            search: SearchParams::default(),
        }
    }
}

/// What the poll loop does after a failed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicyKind {
    /// Stop scheduling ticks until the interval is set again
    #[default]
    Halt,
    /// Retry with exponential backoff, halting after too many failures
    Backoff,
}

/// Poll loop scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds between ticks; 0 leaves the loop paused
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,

    #[serde(default)]
    pub failure_policy: FailurePolicyKind,

    #[serde(default = "defaults::backoff_initial")]
    pub backoff_initial_secs: u64,

    #[serde(default = "defaults::backoff_max")]
    pub backoff_max_secs: u64,

    #[serde(default = "defaults::backoff_attempts")]
    pub backoff_max_attempts: u32,
}

impl PollConfig {
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::interval(),
            failure_policy: FailurePolicyKind::default(),
            backoff_initial_secs: defaults::backoff_initial(),
            backoff_max_secs: defaults::backoff_max(),
            backoff_max_attempts: defaults::backoff_attempts(),
        }
    }
}

/// CSS selectors and patterns describing the results page markup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// One listing card
    pub card: String,
    /// Canonical detail link inside a card
    pub detail_link: String,
    pub price: String,
    pub address: String,
    /// Bed icon whose alt text ends with the bedroom count
    pub bed_icon: String,
    /// Pattern run over the card's next sibling; group 1 is the image URL
    pub image_pattern: String,
    pub next_link: String,
    pub previous_link: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            card: "#sr_content .PropertyCardContainer__container".to_string(),
            detail_link: ".PropertyInformationCommonStyles__propertyPrice--link".to_string(),
            price: ".PropertyInformationCommonStyles__costAmountCopy".to_string(),
            address: ".PropertyInformationCommonStyles__addressCopy".to_string(),
            bed_icon: r#"img[src="https://c1.dmstatic.com/944/images/search/bed.svg"]"#
                .to_string(),
            image_pattern: r#"window\.portraitize\("(.*)""#.to_string(),
            next_link: ".next_page a".to_string(),
            previous_link: ".prev_page a".to_string(),
        }
    }
}

/// Selectors parsed and ready for matching.
#[derive(Debug, Clone)]
pub struct CompiledSelectors {
    pub card: Selector,
    pub detail_link: Selector,
    pub price: Selector,
    pub address: Selector,
    pub bed_icon: Selector,
    pub image_pattern: Regex,
    pub next_link: Selector,
    pub previous_link: Selector,
}

impl SelectorConfig {
    pub fn compile(&self) -> Result<CompiledSelectors> {
        Ok(CompiledSelectors {
            card: parse_selector(&self.card)?,
            detail_link: parse_selector(&self.detail_link)?,
            price: parse_selector(&self.price)?,
            address: parse_selector(&self.address)?,
            bed_icon: parse_selector(&self.bed_icon)?,
            image_pattern: Regex::new(&self.image_pattern)
                .map_err(|e| AppError::selector(&self.image_pattern, e))?,
            next_link: parse_selector(&self.next_link)?,
            previous_link: parse_selector(&self.previous_link)?,
        })
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

mod defaults {
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
    }

    pub fn timeout() -> u64 {
        30
    }

    pub fn host_url() -> String {
        "https://www.daft.ie".to_string()
    }

    pub fn interval() -> u64 {
        10
    }

    pub fn backoff_initial() -> u64 {
        10
    }

    pub fn backoff_max() -> u64 {
        600
    }

    pub fn backoff_attempts() -> u32 {
        8
    }
}
