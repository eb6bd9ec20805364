//! Error taxonomy shared by every stage of the pipeline.

use std::time::Duration;

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while parsing, lowering or solving a predicate.
///
/// All variants except [`Error::Timeout`] are permanent: retrying the same
/// call with the same inputs yields the same error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Malformed predicate text. `position` is a byte offset into the source.
    #[error("syntax error at {position}: {message}")]
    Syntax { position: usize, message: String },

    /// A construct the language deliberately does not implement.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Sort mismatch found while lowering or evaluating.
    #[error("type error: {0}")]
    Type(String),

    /// An identifier that was required is absent.
    #[error("identifier not found: {0}")]
    NotFound(String),

    /// Z3 returned something other than a verdict with a usable model.
    #[error("solver error: {0}")]
    Solver(String),

    /// The solve did not finish before its deadline.
    #[error("solver timed out after {0:?}")]
    Timeout(Duration),
}

impl Error {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        Error::Syntax {
            position,
            message: message.into(),
        }
    }

    /// Returns `true` if the error is worth retrying with a larger deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::syntax(3, "unexpected end of input");
        assert_eq!(err.to_string(), "syntax error at 3: unexpected end of input");

        let err = Error::NotSupported("function call `f`".to_string());
        assert_eq!(err.to_string(), "not supported: function call `f`");

        let err = Error::Solver("canceled".to_string());
        assert_eq!(err.to_string(), "solver error: canceled");
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::Timeout(Duration::from_millis(5)).is_timeout());
        assert!(!Error::NotFound("x".to_string()).is_timeout());
    }
}
