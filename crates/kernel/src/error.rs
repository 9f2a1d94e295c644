//! Query compiler error types.

use thiserror::Error;

/// Errors raised while compiling request parameters.
///
/// All variants describe caller or configuration mistakes; none of them are
/// transient, so callers should translate them into a response rather than
/// retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Malformed pagination input or a missing required compiler argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A relation path segment did not resolve against the model metadata.
    #[error("association \"{association}\" does not exist on model \"{model}\"")]
    UnknownAssociation { model: String, association: String },

    /// The compiler was configured in a way that cannot handle the input
    /// (for example an operator list without a catch-all).
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl QueryError {
    /// Shorthand for [`QueryError::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        QueryError::InvalidArgument(message.into())
    }

    /// Shorthand for [`QueryError::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        QueryError::Configuration(message.into())
    }
}

/// Result type alias using QueryError.
pub type QueryResult<T> = Result<T, QueryError>;
