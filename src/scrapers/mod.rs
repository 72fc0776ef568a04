pub mod base;
pub mod calendar;
pub mod historical;
pub mod investing;
pub mod pages;
pub mod search;
pub mod technical;

use crate::errors::{Result, ScraperError};
use scraper::Selector;

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScraperError::parse("selector", format!("'{}': {}", css, e)))
}
