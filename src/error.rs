//! Per-item failure types.
//!
//! These never abort a run; their `Display` text is what lands in `report.json`.

use thiserror::Error;

/// Why one article did not make it into the output.
#[derive(Debug, Error)]
pub enum ArticleError {
    #[error("article url has no id: {0}")]
    MissingId(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("no title found")]
    MissingTitle,

    #[error("no content region found")]
    MissingContent,

    #[error("write failed: {0}")]
    Write(String),

    #[error("cancelled")]
    Cancelled,
}

/// Why one asset could not be stored locally.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssetError {
    #[error("HTTP status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Request(String),

    #[error("empty body")]
    EmptyBody,

    #[error("body is not a recognized image (content-type: {0})")]
    UnrecognizedImage(String),

    #[error("external fetch disabled")]
    ExternalDisabled,

    #[error("write failed: {0}")]
    Write(String),
}
