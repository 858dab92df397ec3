//! Error types for the LoudML worker.

/// Top-level error type for the worker.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Datasource error: {0}")]
    DataSource(#[from] DataSourceError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),
}

impl Error {
    /// Whether this is an expected failure kind callers can act on.
    ///
    /// Everything else is an internal error: an I/O or serialization fault,
    /// or a collaborator reporting something it did not anticipate.
    pub fn is_domain(&self) -> bool {
        match self {
            Self::Config(_) | Self::Job(_) => true,
            Self::Storage(e) => e.is_domain(),
            Self::DataSource(e) => e.is_domain(),
            Self::Model(e) => e.is_domain(),
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Datasource not found: {name}")]
    DataSourceNotFound { name: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage backend errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Model not found: {name}")]
    ModelNotFound { name: String },

    #[error("Model already exists: {name}")]
    ModelExists { name: String },

    #[error("Invalid model name: {name:?}")]
    InvalidName { name: String },

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to load model {name}: {source}")]
    Load {
        name: String,
        #[source]
        source: ModelError,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn is_domain(&self) -> bool {
        match self {
            Self::ModelNotFound { .. }
            | Self::ModelExists { .. }
            | Self::InvalidName { .. }
            | Self::InvalidValue { .. } => true,
            Self::Load { source, .. } => source.is_domain(),
            Self::Serialization(_) | Self::Io(_) => false,
        }
    }
}

/// Errors raised by datasources.
#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    #[error("Unsupported datasource type: {kind}")]
    UnsupportedType { kind: String },

    #[error("Datasource {name} unreachable: {reason}")]
    Transport { name: String, reason: String },

    #[error("Datasource {name} rejected write: {reason}")]
    WriteFailed { name: String, reason: String },

    #[error("Datasource internal error: {0}")]
    Internal(String),
}

impl DataSourceError {
    pub fn is_domain(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

/// Errors raised by models.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Unsupported model type: {kind}")]
    UnsupportedType { kind: String },

    #[error("Model {name} is not trained")]
    NotTrained { name: String },

    #[error("No data available: {reason}")]
    NoData { reason: String },

    #[error("Invalid model input: {reason}")]
    Invalid { reason: String },

    #[error("Model {name} does not support {operation}")]
    Unsupported { name: String, operation: String },

    #[error("Model internal error: {0}")]
    Internal(String),
}

impl ModelError {
    pub fn is_domain(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }
}

/// Job dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Unknown operation: {name}")]
    UnknownOperation { name: String },

    #[error("Invalid arguments for {operation}: {reason}")]
    InvalidArguments { operation: String, reason: String },

    #[error("Job cancelled before {step}")]
    Cancelled { step: String },
}

/// Classified failure of one job.
///
/// Both variants carry the original error untouched; the tag only tells the
/// caller whether the kind is meaningful to match on.
#[derive(Debug, thiserror::Error)]
pub enum JobFailure {
    #[error(transparent)]
    Domain(Error),

    #[error(transparent)]
    Internal(Error),
}

impl JobFailure {
    pub fn error(&self) -> &Error {
        match self {
            Self::Domain(e) | Self::Internal(e) => e,
        }
    }

    pub fn into_error(self) -> Error {
        match self {
            Self::Domain(e) | Self::Internal(e) => e,
        }
    }

    pub fn is_domain(&self) -> bool {
        matches!(self, Self::Domain(_))
    }
}

/// Result type alias for the worker.
pub type Result<T> = std::result::Result<T, Error>;
