use thiserror::Error;

/// Failure talking to the external match data API. Aborts the fetch it came from.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("could not decode response from {url}: {reason}")]
    Decode { url: String, reason: String },
}

/// One external record that could not be mapped to an internal record.
/// The record is skipped; the rest of the batch goes on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("record {record} rejected: {reason}")]
pub struct RecordConversionError {
    pub record: String,
    pub reason: String,
}

impl RecordConversionError {
    pub fn new(record: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            record: record.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by the repository. Write failures are recovered per record by the sync loop.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("match {match_id} violates {rule}")]
    Invariant { match_id: i64, rule: &'static str },

    #[error("stored value in {column} is corrupt: {value}")]
    Corrupt { column: &'static str, value: String },

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Missing or invalid startup configuration. Never recovered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("required setting {0} is not set")]
    Missing(&'static str),

    #[error("setting {key} has invalid value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Errors surfaced by prediction and quality requests.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("matchday {0} is out of range")]
    InvalidMatchday(i32),
}
