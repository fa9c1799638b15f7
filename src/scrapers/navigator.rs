//! Pagination walker.
//!
//! The results listing has no stable last-page marker, so the walker runs
//! forward until "next" disappears, then backward until "previous"
//! disappears, and repeats. It never halts on its own.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Direction of travel through the result pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => f.write_str("forward"),
            Direction::Backward => f.write_str("backward"),
        }
    }
}

/// Pagination affordances found on a fetched page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLinks {
    pub next: Option<String>,
    pub previous: Option<String>,
}

impl PageLinks {
    fn toward(&self, direction: Direction) -> Option<&str> {
        match direction {
            Direction::Forward => self.next.as_deref(),
            Direction::Backward => self.previous.as_deref(),
        }
    }
}

/// The page offered neither a "next" nor a "previous" link.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("page at {url} has no pagination links")]
pub struct NoNavigation {
    pub url: String,
}

/// Owns the traversal direction and the URL of the page to fetch next.
#[derive(Debug, Clone)]
pub struct PageNavigator {
    direction: Direction,
    current_url: String,
}

impl PageNavigator {
    /// Start walking forward from `start_url`.
    pub fn new(start_url: impl Into<String>) -> Self {
        Self {
            direction: Direction::Forward,
            current_url: start_url.into(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn current_url(&self) -> &str {
        &self.current_url
    }

    /// Pick the next page from the links of the page just fetched.
    ///
    /// Keeps going in the current direction while that link exists,
    /// otherwise reverses and takes the opposite link. When neither link
    /// exists, state is left untouched and the same URL is retried.
    pub fn advance(&mut self, links: &PageLinks) -> Result<&str, NoNavigation> {
        if let Some(target) = links.toward(self.direction) {
            debug!(direction = %self.direction, url = target, "Continuing");
            self.current_url = target.to_string();
            return Ok(self.current_url.as_str());
        }

        let reversed = self.direction.reversed();
        match links.toward(reversed) {
            Some(target) => {
                info!(from = %self.direction, to = %reversed, "Reached end of results, reversing");
                self.direction = reversed;
                self.current_url = target.to_string();
                Ok(self.current_url.as_str())
            }
            None => Err(NoNavigation {
                url: self.current_url.clone(),
            }),
        }
    }
}
