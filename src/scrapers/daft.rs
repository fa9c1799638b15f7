//! Listing extraction for daft.ie result pages.
//!
//! Everything here is pure: markup in, records out. No network or storage
//! access happens in this module.

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::{CompiledSelectors, SelectorConfig};
use crate::error::Result;
use crate::models::{gmaps_url, listing_id, Rental};
use crate::scrapers::navigator::PageLinks;

/// Why a card produced no record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionFailure {
    #[error("card has no detail link")]
    MissingDetailLink,
    #[error("detail link '{0}' is not a valid URL")]
    InvalidDetailLink(String),
}

/// Records and navigation read from one results page.
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub links: PageLinks,
    pub rentals: Vec<Rental>,
    /// Cards that failed extraction
    pub dropped: usize,
}

/// Turns result-page markup into rentals and pagination links.
#[derive(Debug, Clone)]
pub struct DaftExtractor {
    host: Url,
    selectors: CompiledSelectors,
}

impl DaftExtractor {
    pub fn new(host_url: &str, selectors: &SelectorConfig) -> Result<Self> {
        let host = Url::parse(host_url)?;
        let selectors = selectors.compile()?;
        Ok(Self { host, selectors })
    }

    /// Extractor using the stock site markup.
    pub fn with_default_selectors(host_url: &str) -> Result<Self> {
        Self::new(host_url, &SelectorConfig::default())
    }

    /// Parse a full results page.
    pub fn parse_page(&self, html: &str) -> ParsedPage {
        let document = Html::parse_document(html);
        let links = self.page_links(&document);

        let mut rentals = Vec::new();
        let mut dropped = 0;
        for card in document.select(&self.selectors.card) {
            match self.extract(card) {
                Ok(rental) => rentals.push(rental),
                Err(failure) => {
                    debug!("Dropping card: {}", failure);
                    dropped += 1;
                }
            }
        }

        ParsedPage {
            links,
            rentals,
            dropped,
        }
    }

    /// Read the "next" and "previous" affordances of a page.
    ///
    /// An affordance counts as present only when it carries a non-empty href.
    pub fn page_links(&self, document: &Html) -> PageLinks {
        PageLinks {
            next: first_href(document.root_element(), &self.selectors.next_link),
            previous: first_href(document.root_element(), &self.selectors.previous_link),
        }
    }

    /// Extract one rental from a card element.
    pub fn extract(&self, card: ElementRef<'_>) -> std::result::Result<Rental, ExtractionFailure> {
        let href = first_href(card, &self.selectors.detail_link)
            .ok_or(ExtractionFailure::MissingDetailLink)?;
        let url = self
            .host
            .join(&href)
            .map_err(|_| ExtractionFailure::InvalidDetailLink(href.clone()))?
            .to_string();

        let price = first_text(card, &self.selectors.price);
        let address = first_text(card, &self.selectors.address);
        let beds = card
            .select(&self.selectors.bed_icon)
            .next()
            .and_then(|img| img.value().attr("alt"))
            .and_then(|alt| alt.chars().last())
            .map(String::from)
            .unwrap_or_default();

        Ok(Rental {
            id: listing_id(&url),
            gmaps_url: gmaps_url(&address),
            img_url: self.image_url(card),
            url,
            price,
            address,
            beds,
        })
    }

    /// Image URL embedded in a script of the element after the card.
    fn image_url(&self, card: ElementRef<'_>) -> String {
        card.next_siblings()
            .find_map(ElementRef::wrap)
            .and_then(|sibling| {
                let html = sibling.inner_html();
                self.selectors
                    .image_pattern
                    .captures(&html)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().to_string())
            })
            .unwrap_or_default()
    }
}

fn first_href(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .filter_map(|el| el.value().attr("href"))
        .map(str::trim)
        .find(|href| !href.is_empty())
        .map(String::from)
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> String {
    scope
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARD_OK: &str = r#"
        <div class="PropertyCardContainer__container">
            <a class="PropertyInformationCommonStyles__propertyPrice--link"
               href="/dublin/apartments-for-rent/ballsbridge/mespil-estate-2019208/">
                <span class="PropertyInformationCommonStyles__costAmountCopy"> €2,100 per month </span>
            </a>
            <p class="PropertyInformationCommonStyles__addressCopy">Mespil Estate, Ballsbridge, Dublin 4</p>
            <img src="https://c1.dmstatic.com/944/images/search/bed.svg" alt="Beds: 2">
        </div>
        <div class="PropertyImage"><script>window.portraitize("https://img.example.com/2019208.jpg", 1)</script></div>
    "#;

    const CARD_NO_LINK: &str = r#"
        <div class="PropertyCardContainer__container">
            <span class="PropertyInformationCommonStyles__costAmountCopy">€1,700</span>
            <p class="PropertyInformationCommonStyles__addressCopy">Somewhere, Dublin 8</p>
        </div>
    "#;

    const CARD_BARE: &str = r#"
        <div class="PropertyCardContainer__container">
            <a class="PropertyInformationCommonStyles__propertyPrice--link" href="/dublin/flat-1234567/">x</a>
        </div>
    "#;

    fn page(cards: &[&str], next: Option<&str>, prev: Option<&str>) -> String {
        let mut html = String::from("<html><body><div id=\"sr_content\">");
        for card in cards {
            html.push_str(card);
        }
        html.push_str("</div><ul class=\"pagination\">");
        if let Some(prev) = prev {
            html.push_str(&format!("<li class=\"prev_page\"><a href=\"{prev}\">Prev</a></li>"));
        }
        if let Some(next) = next {
            html.push_str(&format!("<li class=\"next_page\"><a href=\"{next}\">Next</a></li>"));
        }
        html.push_str("</ul></body></html>");
        html
    }

    fn extractor() -> DaftExtractor {
        DaftExtractor::with_default_selectors("https://www.daft.ie").unwrap()
    }

    #[test]
    fn test_extracts_all_fields() {
        let parsed = extractor().parse_page(&page(&[CARD_OK], None, None));
        assert_eq!(parsed.rentals.len(), 1);

        let rental = &parsed.rentals[0];
        assert_eq!(
            rental.url,
            "https://www.daft.ie/dublin/apartments-for-rent/ballsbridge/mespil-estate-2019208/"
        );
        assert_eq!(rental.id, "2019208");
        assert_eq!(rental.price, "€2,100 per month");
        assert_eq!(rental.address, "Mespil Estate, Ballsbridge, Dublin 4");
        assert_eq!(rental.beds, "2");
        assert_eq!(rental.img_url, "https://img.example.com/2019208.jpg");
        assert!(rental.gmaps_url.starts_with("https://www.google.com/maps/place/Mespil%20Estate"));
    }

    #[test]
    fn test_same_card_same_id() {
        let html = page(&[CARD_OK], None, None);
        let first = extractor().parse_page(&html);
        let second = extractor().parse_page(&html);
        assert_eq!(first.rentals[0].id, second.rentals[0].id);
    }

    #[test]
    fn test_card_without_detail_link_is_dropped() {
        let parsed = extractor().parse_page(&page(&[CARD_OK, CARD_NO_LINK], None, None));
        assert_eq!(parsed.rentals.len(), 1);
        assert_eq!(parsed.dropped, 1);
        assert_eq!(parsed.rentals[0].id, "2019208");
    }

    #[test]
    fn test_missing_link_reports_failure() {
        let ex = extractor();
        let document = Html::parse_document(&page(&[CARD_NO_LINK], None, None));
        let card = document.select(&ex.selectors.card).next().unwrap();
        assert!(matches!(
            ex.extract(card),
            Err(ExtractionFailure::MissingDetailLink)
        ));
    }

    #[test]
    fn test_optional_fields_default_to_empty() {
        let parsed = extractor().parse_page(&page(&[CARD_BARE], None, None));
        let rental = &parsed.rentals[0];
        assert_eq!(rental.id, "1234567");
        assert_eq!(rental.img_url, "");
        assert_eq!(rental.beds, "");
        assert_eq!(rental.price, "");
    }

    #[test]
    fn test_cards_outside_results_are_ignored() {
        let html = format!("<html><body>{CARD_OK}<div id=\"sr_content\"></div></body></html>");
        assert!(extractor().parse_page(&html).rentals.is_empty());
    }

    #[test]
    fn test_page_links() {
        let parsed = extractor().parse_page(&page(&[], Some("/rent/?offset=40"), Some("/rent/?offset=0")));
        assert_eq!(parsed.links.next.as_deref(), Some("/rent/?offset=40"));
        assert_eq!(parsed.links.previous.as_deref(), Some("/rent/?offset=0"));

        let parsed = extractor().parse_page(&page(&[], None, None));
        assert_eq!(parsed.links, PageLinks::default());
    }

    #[test]
    fn test_empty_href_is_not_an_affordance() {
        let parsed = extractor().parse_page(&page(&[], Some(""), None));
        assert!(parsed.links.next.is_none());
    }
}
