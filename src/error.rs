use thiserror::Error;

/// Failure of a single upstream query.
///
/// Fan-out callers log these and drop the source; only direct single-match
/// queries surface them to the caller.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("match {0} not found")]
    NotFound(i64),

    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),
}

pub type FeedResult<T> = std::result::Result<T, FeedError>;
