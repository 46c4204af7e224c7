mod fetcher;
mod models;
mod parser;

pub use fetcher::{FeedFetcher, FeedSource};
pub use models::{Item, RawEntry};
pub use parser::parse_feed;
