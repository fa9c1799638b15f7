#[cfg(feature = "browser")]
pub mod browser;
pub mod daft;
pub mod http;
pub mod navigator;
pub mod traits;
pub mod types;

#[cfg(feature = "browser")]
pub use browser::BrowserFetcher;
pub use daft::{DaftExtractor, ExtractionFailure, ParsedPage};
pub use http::HttpFetcher;
pub use navigator::{Direction, NoNavigation, PageLinks, PageNavigator};
pub use traits::Fetcher;
pub use types::SearchParams;
