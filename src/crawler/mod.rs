pub mod fetcher;
pub mod web_page;

pub use fetcher::{FetchedPage, Fetcher, HttpFetcher};
pub use web_page::WebPageExtractor;
