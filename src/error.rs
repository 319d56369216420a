//! Error types for the collector and its exporters

use crate::session::RequestOutcome;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by collection, configuration and export
#[derive(Error, Debug)]
pub enum CollectorError {
    /// A record operation was invoked while no session was active
    #[error("No active session: begin_session must be called before recording events")]
    NoActiveSession,

    /// An event was missing a required field and was rejected
    #[error("Malformed event: missing {field}")]
    MalformedEvent { field: &'static str },

    /// Invalid or unresolvable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A document could not be written to its sink
    #[error("Failed to write export to {}: {source}", .path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The request was finished but an export failed. The finished outcome,
    /// report included, is kept.
    #[error("Request finished but export failed: {source}")]
    ExportIncomplete {
        outcome: Box<RequestOutcome>,
        #[source]
        source: Box<CollectorError>,
    },

    #[error("Failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for collector operations
pub type Result<T> = std::result::Result<T, CollectorError>;

impl CollectorError {
    /// The finished request carried by [`CollectorError::ExportIncomplete`]
    pub fn outcome(&self) -> Option<&RequestOutcome> {
        match self {
            Self::ExportIncomplete { outcome, .. } => Some(outcome),
            _ => None,
        }
    }
}
