//! Loader error types

use thiserror::Error;

/// Errors reported by a [`Loader`](super::Loader)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoaderError {
    #[error("template '{0}' not found")]
    NotFound(String),

    #[error("transient loader error: {0}")]
    Transient(String),

    #[error("loader error: {0}")]
    Other(String),
}

impl LoaderError {
    /// Check if this is a not-found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoaderError::NotFound(_))
    }

    /// Check if a later call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            LoaderError::NotFound(_) => true,
            LoaderError::Transient(_) => true,
            LoaderError::Other(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        assert!(LoaderError::NotFound("greet".to_string()).is_not_found());
        assert!(!LoaderError::Transient("503".to_string()).is_not_found());
    }

    #[test]
    fn test_is_retryable() {
        // Registry may publish the template later
        assert!(LoaderError::NotFound("greet".to_string()).is_retryable());
        assert!(LoaderError::Transient("connection reset".to_string()).is_retryable());
        assert!(!LoaderError::Other("bad credentials".to_string()).is_retryable());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            LoaderError::NotFound("greet".to_string()).to_string(),
            "template 'greet' not found"
        );
    }
}
