use thiserror::Error;

// Unified error type for lazyvar

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LazyError {
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl LazyError {
    pub(crate) fn shape(expected: impl std::fmt::Display, found: impl std::fmt::Display) -> Self {
        LazyError::ShapeMismatch(format!("expected {expected}, found {found}"))
    }
}
