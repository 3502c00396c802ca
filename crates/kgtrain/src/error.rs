use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in kgtrain.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// TOML configuration could not be parsed.
    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),
    /// A dataset file is missing a field, has a bad count, or is otherwise malformed.
    #[error("{}:{line}: {message}", path.display())]
    DataFormat {
        path: PathBuf,
        line: usize,
        message: String,
    },
    /// An entity or relation id in a dataset file exceeds the declared total.
    #[error("{}:{line}: {kind} id {id} out of range (total {limit})", path.display())]
    IdOutOfRange {
        path: PathBuf,
        line: usize,
        kind: &'static str,
        id: u64,
        limit: usize,
    },
    /// An evaluation was requested over an empty split.
    #[error("No data: {0}")]
    NoData(String),
    /// Calls into a stateful engine arrived in the wrong order or with the wrong length.
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// Configuration values are inconsistent or unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// A query names an entity or relation the store does not have.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    /// A named parameter is missing from an import.
    #[error("Parameter not found: {0}")]
    ParameterNotFound(String),
    /// A parameter array does not have the expected shape.
    #[error("Shape mismatch for {name}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

impl Error {
    pub(crate) fn data_format(
        path: impl Into<PathBuf>,
        line: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::DataFormat {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

/// Result type alias for kgtrain.
pub type Result<T> = std::result::Result<T, Error>;
