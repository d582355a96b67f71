//! Error types for the retrieval pipeline.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Chunker configuration error: overlap {overlap} must be smaller than chunk size {chunk_size}")]
    ChunkerConfig { chunk_size: usize, overlap: usize },

    #[error("Embedding error{}: {message}", ordinal_suffix(.ordinal))]
    Embedding {
        ordinal: Option<usize>,
        message: String,
    },

    #[error("Invalid dimension{}: expected {expected}, got {got}", ordinal_suffix(.ordinal))]
    DimensionMismatch {
        ordinal: Option<usize>,
        expected: usize,
        got: usize,
    },

    #[error("Index is empty")]
    IndexEmpty,

    #[error("Corrupt index: {0}")]
    CorruptIndex(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("No index available: build one from a document first")]
    NoIndexAvailable,

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn ordinal_suffix(ordinal: &Option<usize>) -> String {
    ordinal
        .map(|ordinal| format!(" at chunk {}", ordinal))
        .unwrap_or_default()
}

impl RagError {
    pub fn extraction(msg: impl Into<String>) -> Self {
        Self::Extraction(msg.into())
    }

    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding {
            ordinal: None,
            message: msg.into(),
        }
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptIndex(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Attach the chunk ordinal an embedding or dimension error belongs to.
    pub fn at_ordinal(self, ordinal: usize) -> Self {
        match self {
            Self::Embedding { message, .. } => Self::Embedding {
                ordinal: Some(ordinal),
                message,
            },
            Self::DimensionMismatch { expected, got, .. } => Self::DimensionMismatch {
                ordinal: Some(ordinal),
                expected,
                got,
            },
            other => other,
        }
    }

    /// Pipeline stage the error originated in.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Extraction(_) => "extraction",
            Self::ChunkerConfig { .. } => "chunking",
            Self::Embedding { .. } => "embedding",
            Self::DimensionMismatch { .. } | Self::IndexEmpty => "indexing",
            Self::CorruptIndex(_) | Self::Serialization(_) | Self::Io(_) => "persistence",
            Self::NoIndexAvailable => "query",
            Self::Generation(_) => "generation",
            Self::Config(_) => "configuration",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_error_carries_ordinal() {
        let err = RagError::embedding("rate limited").at_ordinal(2);
        assert_eq!(err.to_string(), "Embedding error at chunk 2: rate limited");
        assert_eq!(err.stage(), "embedding");
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = RagError::DimensionMismatch {
            ordinal: Some(3),
            expected: 4,
            got: 2,
        };
        assert_eq!(err.to_string(), "Invalid dimension at chunk 3: expected 4, got 2");

        let err = RagError::DimensionMismatch {
            ordinal: None,
            expected: 4,
            got: 2,
        };
        assert_eq!(err.to_string(), "Invalid dimension: expected 4, got 2");
    }

    #[test]
    fn test_at_ordinal_leaves_other_errors_alone() {
        let err = RagError::IndexEmpty.at_ordinal(7);
        assert!(matches!(err, RagError::IndexEmpty));
    }

    #[test]
    fn test_serialization_error_is_not_corruption() {
        let err = RagError::serialization("vector artifact: out of memory");
        assert!(!matches!(err, RagError::CorruptIndex(_)));
        assert_eq!(err.stage(), "persistence");
        assert_eq!(
            err.to_string(),
            "Serialization error: vector artifact: out of memory"
        );
    }
}
