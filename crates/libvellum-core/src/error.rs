use thiserror::Error;

/// Errors raised by snapshot stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot not found: {0}")]
    NotFound(String),

    #[error("snapshot content mismatch: expected {expected}, computed {computed}")]
    Corrupt { expected: String, computed: String },

    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CBOR encode error: {0}")]
    Cbor(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Main error type for vellum core operations
#[derive(Debug, Error)]
pub enum VellumError {
    #[error("malformed selector: {0}")]
    MalformedSelector(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("cannot drop generation {generation} of '{field}', only the current value can be dropped")]
    UnsupportedGeneration { field: String, generation: u32 },

    #[error("cannot drop component: {0:?}")]
    UnknownComponent(String),

    #[error("insufficient history: asked to remove {requested} revisions, {available} available")]
    InsufficientHistory { requested: usize, available: usize },

    #[error("unknown lineage: {0}")]
    UnknownLineage(String),

    #[error("lineage already exists: {0}")]
    LineageExists(String),

    #[error("actor {actor} cannot write to a log authored by {author}")]
    NotAuthor { actor: String, author: String },

    #[error("histories diverge: {0}")]
    Divergence(String),

    #[error("invalid log entry: {0}")]
    InvalidEntry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("ID parse error: {0}")]
    IdParse(#[from] crate::types::ids::IdParseError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sled::Error> for VellumError {
    fn from(e: sled::Error) -> Self {
        VellumError::Store(StoreError::Sled(e))
    }
}

impl VellumError {
    /// Stable error code for structured output
    pub fn error_code(&self) -> &'static str {
        match self {
            VellumError::MalformedSelector(_) => "malformed_selector",
            VellumError::Store(StoreError::NotFound(_)) => "not_found",
            VellumError::Store(_) => "store_error",
            VellumError::UnsupportedGeneration { .. } => "unsupported_generation",
            VellumError::UnknownComponent(_) => "unknown_component",
            VellumError::InsufficientHistory { .. } => "insufficient_history",
            VellumError::UnknownLineage(_) => "unknown_lineage",
            VellumError::LineageExists(_) => "conflict",
            VellumError::NotAuthor { .. } => "not_author",
            VellumError::Divergence(_) => "divergence",
            VellumError::InvalidEntry(_) => "invalid_entry",
            VellumError::Io(_) => "io_error",
            VellumError::Json(_) => "internal_error",
            VellumError::TomlParse(_) => "invalid_args",
            VellumError::TomlSerialize(_) => "internal_error",
            VellumError::IdParse(_) => "invalid_args",
            VellumError::Internal(_) => "internal_error",
        }
    }

    /// Whether the error should be handled by fetching missing data first
    pub fn is_not_found(&self) -> bool {
        matches!(self, VellumError::Store(StoreError::NotFound(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            VellumError::MalformedSelector("xx".to_string()).error_code(),
            "malformed_selector"
        );
        let missing = VellumError::from(StoreError::NotFound("/blake2b/00".to_string()));
        assert_eq!(missing.error_code(), "not_found");
        assert!(missing.is_not_found());
        assert_eq!(
            VellumError::InsufficientHistory {
                requested: 3,
                available: 1
            }
            .error_code(),
            "insufficient_history"
        );
    }
}
