//! Browser-driven post scraping: session handling, feed scrolling, DOM
//! extraction, and count normalization.

pub mod browser;
pub mod count;
pub mod error;
pub mod extract;
pub mod orchestrator;
mod retry;
pub mod scroll;
pub mod service;
pub mod session;

pub use browser::chromium::ChromiumLauncher;
pub use browser::{BrowserLauncher, BrowserPage};
pub use count::parse_count;
pub use error::ScraperError;
pub use extract::{extract_posts, CompiledSelectors, RawPost};
pub use orchestrator::{FeedScraper, ScrapeSettings};
pub use scroll::{load_until, ScrollPolicy};
pub use service::{BrowserScrapeService, ScrapeBackend};
pub use session::{Credentials, SessionManager, SessionOptions, SessionState};
