pub mod analyst;
pub mod scraper;
