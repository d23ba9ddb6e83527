//! Error types for sqlweave

use thiserror::Error;

/// The result type for sqlweave operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, rewriting, encoding or rendering trees
#[derive(Debug, Error)]
pub enum Error {
    /// A node invariant was violated while the node was being built
    #[error("Construction error in {kind}: {message}")]
    Construction { kind: String, message: String },

    /// Malformed or incomplete serialized input
    #[error("Codec error: {0}")]
    Codec(String),

    /// A node cannot be rendered because a structural precondition is absent
    #[error("Generation error: {0}")]
    Generate(String),

    /// Unsupported feature for the target dialect
    #[error("Unsupported: {feature} is not supported in {dialect}")]
    Unsupported { feature: String, dialect: String },

    /// A structural rewrite could not be applied
    #[error("Rewrite error: {0}")]
    Rewrite(String),

    /// JSON projection could not be read or written
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// XML projection could not be read or written
    #[error("XML error: {0}")]
    Xml(String),
}

impl Error {
    /// Create a construction error for the given node kind
    pub fn construction(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Construction {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create a codec error
    pub fn codec(message: impl Into<String>) -> Self {
        Error::Codec(message.into())
    }

    /// Create a generation error
    pub fn generate(message: impl Into<String>) -> Self {
        Error::Generate(message.into())
    }

    /// Create an unsupported feature error
    pub fn unsupported(feature: impl Into<String>, dialect: impl Into<String>) -> Self {
        Error::Unsupported {
            feature: feature.into(),
            dialect: dialect.into(),
        }
    }

    /// Create a rewrite error
    pub fn rewrite(message: impl Into<String>) -> Self {
        Error::Rewrite(message.into())
    }

    /// Create an XML error
    pub fn xml(message: impl Into<String>) -> Self {
        Error::Xml(message.into())
    }

    /// Returns `true` if this error is an unsupported-feature error
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported { .. })
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Xml(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::unsupported("MERGE", "MySQL");
        assert_eq!(err.to_string(), "Unsupported: MERGE is not supported in MySQL");
        assert!(err.is_unsupported());

        let err = Error::construction("SqlType", "CHAR requires an explicit size");
        assert_eq!(
            err.to_string(),
            "Construction error in SqlType: CHAR requires an explicit size"
        );
    }
}
