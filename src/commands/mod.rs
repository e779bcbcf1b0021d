pub mod analyze;
pub mod clean;
pub mod crawl;
