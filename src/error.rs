use thiserror::Error;

#[derive(Error, Debug)]
pub enum TesseraError {
    // Schema errors
    #[error("invalid field spec: {0}")]
    InvalidFieldSpec(String),

    #[error("index not found: {name}")]
    IndexNotFound { name: String },

    #[error("index already exists: {name}")]
    DuplicateIndex { name: String },

    // Document errors
    #[error("document not found: {key}")]
    DocumentNotFound { key: String },

    #[error("invalid value for field '{field}': {reason}")]
    InvalidFieldValue { field: String, reason: String },

    // Vector errors
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    // Query errors
    #[error("malformed query at position {position}: {reason}")]
    MalformedQuery { position: usize, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    // Config errors
    #[error("config error: {0}")]
    Config(String),

    // Persistence errors
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("checksum mismatch for record '{key}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // Internal
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, TesseraError>;

impl TesseraError {
    pub fn malformed(position: usize, reason: impl Into<String>) -> Self {
        TesseraError::MalformedQuery {
            position,
            reason: reason.into(),
        }
    }

    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        TesseraError::InvalidFieldValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            TesseraError::InvalidFieldSpec(_) => "invalid_field_spec",
            TesseraError::IndexNotFound { .. } => "index_not_found",
            TesseraError::DuplicateIndex { .. } => "duplicate_index",
            TesseraError::DocumentNotFound { .. } => "document_not_found",
            TesseraError::InvalidFieldValue { .. } => "invalid_field_value",
            TesseraError::DimensionMismatch { .. } => "dimension_mismatch",
            TesseraError::MalformedQuery { .. } => "malformed_query",
            TesseraError::Cancelled => "cancelled",
            TesseraError::Config(_) => "config",
            TesseraError::Json(_) => "json",
            TesseraError::ChecksumMismatch { .. } => "checksum_mismatch",
            TesseraError::Io(_) => "io",
            TesseraError::Internal(_) => "internal",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            TesseraError::IndexNotFound { .. } | TesseraError::DocumentNotFound { .. } => 404,

            TesseraError::DuplicateIndex { .. } => 409,

            TesseraError::InvalidFieldSpec(_)
            | TesseraError::InvalidFieldValue { .. }
            | TesseraError::DimensionMismatch { .. }
            | TesseraError::MalformedQuery { .. } => 400,

            TesseraError::Cancelled => 408,

            _ => 500,
        }
    }
}
