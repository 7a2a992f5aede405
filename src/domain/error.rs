//! Domain error types.

/// Top-level error type for barcache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid timeframe '{value}': {reason}")]
    InvalidTimeframe { value: String, reason: String },

    #[error("invalid date '{value}' (expected YYYY-MM-DD)")]
    InvalidDate { value: String },

    #[error("invalid bar data: {reason}")]
    Validation { reason: String },

    #[error("storage error at {path}: {reason}")]
    Storage { path: String, reason: String },

    #[error("catalog references {path} but the file does not exist")]
    MissingFile { path: String },

    #[error("provider {provider} failed: {reason}")]
    Provider { provider: String, reason: String },

    #[error("provider {provider} did not answer within {secs}s")]
    Timeout { provider: String, secs: u64 },

    #[error("fetch cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CacheError {
    /// Failures worth another attempt against the same provider.
    ///
    /// A timeout is not: the abandoned call may still be running, and a retry
    /// would put a second request in flight next to it.
    pub fn is_transient(&self) -> bool {
        matches!(self, CacheError::Provider { .. })
    }
}

impl From<&CacheError> for std::process::ExitCode {
    fn from(err: &CacheError) -> Self {
        let code: u8 = match err {
            CacheError::Io(_) => 1,
            CacheError::ConfigParse { .. }
            | CacheError::ConfigMissing { .. }
            | CacheError::ConfigInvalid { .. } => 2,
            CacheError::Database { .. } | CacheError::DatabaseQuery { .. } => 3,
            CacheError::InvalidTimeframe { .. }
            | CacheError::InvalidDate { .. }
            | CacheError::Validation { .. } => 4,
            CacheError::Storage { .. } | CacheError::MissingFile { .. } => 5,
            CacheError::Provider { .. } | CacheError::Timeout { .. } | CacheError::Cancelled => 6,
        };
        std::process::ExitCode::from(code)
    }
}
