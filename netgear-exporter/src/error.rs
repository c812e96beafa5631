use thiserror::Error;

/// Error aborting a scrape cycle.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed page: {0}")]
    MalformedPage(String),

    #[error("Poller terminated by an earlier failure")]
    Terminated,
}

/// A numeric cell that could not be converted. Never aborts a cycle.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("failed to parse {field} from {text:?}")]
pub struct FieldParseError {
    /// Field name, e.g. "power".
    pub field: &'static str,
    /// The raw cell text.
    pub text: String,
}

/// Result type alias for scrape operations.
pub type Result<T> = std::result::Result<T, ScrapeError>;
