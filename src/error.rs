use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Clone, Error, Diagnostic)]
pub enum CollectError {
    #[error("invalid dataset id: {0}")]
    InvalidDatasetId(String),

    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("unknown metadata type: {0}")]
    UnknownMetadataType(String),

    #[error("invalid version stamp: {0}")]
    InvalidVersion(String),

    #[error("no source configured")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("{url} returned status {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    #[error("metadata unavailable for {dataset}: {reason}")]
    MetadataUnavailable { dataset: String, reason: String },

    #[error("failed to read resource catalog: {0}")]
    CatalogRead(String),

    #[error("failed to write resource catalog: {0}")]
    CatalogWrite(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl CollectError {
    pub fn parse(what: impl Into<String>, message: impl ToString) -> Self {
        CollectError::Parse {
            what: what.into(),
            message: message.to_string(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, CollectError::Http { .. } | CollectError::Status { .. })
    }
}
