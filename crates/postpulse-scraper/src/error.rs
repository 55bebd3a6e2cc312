use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    #[error("browser protocol error: {0}")]
    Browser(#[from] chromiumoxide::error::CdpError),

    #[error("browser script for {context} returned unexpected data: {source}")]
    Script {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("persisted cookie {name} is invalid: {reason}")]
    InvalidCookie { name: String, reason: String },

    #[error("no element matches selector {selector}")]
    ElementNotFound { selector: String },

    #[error("scrape timed out after {}s", .0.as_secs())]
    TimedOut(std::time::Duration),

    #[error("browser session is not started")]
    NotStarted,

    #[error("failed to access session state file {path}: {source}")]
    SessionStateIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("session state file {path} is malformed: {source}")]
    SessionStateParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ScraperError {
    /// Authentication failures are the only scrape errors surfaced to callers;
    /// everything else degrades to an empty result.
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        matches!(self, ScraperError::Authentication(_))
    }
}
