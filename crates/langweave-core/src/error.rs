//! Error types for langweave-core

use thiserror::Error;

/// Result type alias for langweave-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in langweave-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse YAML configuration
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// Macro expansion error
    #[error("macro error in '{macro_name}': {message}")]
    MacroError {
        /// Name of the macro
        macro_name: String,
        /// Description of the error
        message: String,
        /// Source file path
        file: Option<std::path::PathBuf>,
    },

    /// Credentials could not be loaded or signed
    #[error("credentials error: {message}")]
    Credentials {
        /// Description of the error
        message: String,
    },

    /// The Natural Language API call failed (transport, auth, quota, server)
    #[error("language service error{}: {message}", http_status(.status))]
    Service {
        /// HTTP status, if a response was received
        status: Option<u16>,
        /// Error message reported by the service or transport
        message: String,
    },

    /// A flattened response does not fit the output schema
    #[error("projection error at '{path}': {message}")]
    Projection {
        /// Dotted path of the offending field
        path: String,
        /// Description of the mismatch
        message: String,
    },

    /// The service returned something other than a JSON object
    #[error("unexpected response: {message}")]
    UnexpectedResponse {
        /// Description of the problem
        message: String,
    },

    /// The configured source field is absent from an input record
    #[error("source field '{field}' not found in input record")]
    MissingSourceField {
        /// Name of the source field
        field: String,
    },

    /// The source field holds something other than text
    #[error("source field '{field}' must be a string, found {found}")]
    NonTextInput {
        /// Name of the source field
        field: String,
        /// JSON type that was found instead
        found: &'static str,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the failure belongs to a single item and may be skipped or
    /// routed to an error output. Configuration and input-shape errors are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Service { .. } | Self::Projection { .. } | Self::UnexpectedResponse { .. }
        )
    }

    pub(crate) fn projection(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Projection {
            path: path.into(),
            message: message.into(),
        }
    }
}

fn http_status(status: &Option<u16>) -> String {
    status.map(|code| format!(" (HTTP {code})")).unwrap_or_default()
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Service {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}
