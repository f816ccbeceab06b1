use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

/// Error kinds for docket operations.
///
/// Each kind describes one category of failure. Configuration kinds are only
/// ever produced while a repository method is being constructed; execution
/// kinds are produced per invocation.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Configuration errors - raised when a repository method is built,
    // never deferred to invocation time.
    /// The repository method declaration is invalid (unsupported keyword,
    /// mixed placeholder styles, ambiguous count/exists/delete intent,
    /// conflicting pagination parameters)
    InvalidQueryMethod,
    /// A query could not be derived from the method declaration
    QueryCreationError,

    // Execution errors - raised per invocation.
    /// A primitive projection produced a result shape other than exactly
    /// one row with exactly one column
    AmbiguousResult,
    /// A required document was not found
    DocumentNotFound,
    /// A raw row could not be converted into the target type
    ConversionError,
    /// Invalid data encountered while binding or converting values
    InvalidDataType,

    // Store failures, translated from the store facade's native error types.
    /// The store did not answer within its deadline
    Timeout,
    /// A write collided with an existing key
    DuplicateKey,
    /// An optimistic-lock version check failed
    VersionMismatch,
    /// Any other store-level failure
    StoreError,

    // Operation errors.
    /// The operation is not valid in the current context
    InvalidOperation,

    // Extension errors - allows backend crates to plug in their own error
    // category. The String carries the extension name (e.g. "view", "spatial").
    /// Error from an extension backend
    Extension(String),

    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidQueryMethod => write!(f, "Invalid query method"),
            ErrorKind::QueryCreationError => write!(f, "Query creation error"),
            ErrorKind::AmbiguousResult => write!(f, "Ambiguous result"),
            ErrorKind::DocumentNotFound => write!(f, "Document not found"),
            ErrorKind::ConversionError => write!(f, "Conversion error"),
            ErrorKind::InvalidDataType => write!(f, "Invalid data type"),
            ErrorKind::Timeout => write!(f, "Timeout"),
            ErrorKind::DuplicateKey => write!(f, "Duplicate key"),
            ErrorKind::VersionMismatch => write!(f, "Version mismatch"),
            ErrorKind::StoreError => write!(f, "Store error"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::Extension(name) => write!(f, "{} error", name),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom docket error type.
///
/// `DocketError` carries the error message, kind, an optional cause and a
/// backtrace captured at construction. Configuration errors abort eagerly and
/// are never retried; store-level execution errors are propagated unchanged.
///
/// # Examples
///
/// ```rust,ignore
/// use docket::errors::{DocketError, ErrorKind};
///
/// let err = DocketError::new("Unsupported keyword: Near", ErrorKind::InvalidQueryMethod);
/// ```
#[derive(Clone)]
pub struct DocketError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<DocketError>>,
    backtrace: Backtrace,
}

impl DocketError {
    /// Creates a new `DocketError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        DocketError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: Backtrace::new(),
        }
    }

    /// Creates a new `DocketError` with a cause error.
    ///
    /// The cause is preserved for debugging and exposed through
    /// [`Error::source`].
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: DocketError) -> Self {
        DocketError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: Backtrace::new(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&DocketError> {
        self.cause.as_deref()
    }
}

impl Display for DocketError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for DocketError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // print error message with stack trace followed by cause
        match &self.cause {
            Some(cause) => write!(f, "{}\nCaused by: {:?}", self.message, cause),
            None => write!(f, "{}\n{:?}", self.message, self.backtrace),
        }
    }
}

impl Error for DocketError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// A result type alias for docket operations.
///
/// `DocketResult<T>` is shorthand for `Result<T, DocketError>`. All fallible
/// operations in this crate return it.
pub type DocketResult<T> = Result<T, DocketError>;

// From trait implementations for automatic error conversion
impl From<serde_json::Error> for DocketError {
    fn from(err: serde_json::Error) -> Self {
        DocketError::new(
            &format!("JSON conversion error: {}", err),
            ErrorKind::ConversionError,
        )
    }
}

impl From<String> for DocketError {
    fn from(msg: String) -> Self {
        DocketError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for DocketError {
    fn from(msg: &str) -> Self {
        DocketError::new(msg, ErrorKind::InternalError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_new() {
        let err = DocketError::new("bad method", ErrorKind::InvalidQueryMethod);
        assert_eq!(err.message(), "bad method");
        assert_eq!(err.kind(), &ErrorKind::InvalidQueryMethod);
        assert!(err.cause().is_none());
    }

    #[test]
    fn test_error_with_cause() {
        let cause = DocketError::new("timeout", ErrorKind::Timeout);
        let err = DocketError::new_with_cause("query failed", ErrorKind::StoreError, cause);
        assert_eq!(err.message(), "query failed");
        assert_eq!(err.cause().unwrap().kind(), &ErrorKind::Timeout);
        assert!(err.source().is_some());
    }

    #[test]
    fn test_error_display() {
        let err = DocketError::new("something broke", ErrorKind::InternalError);
        assert_eq!(format!("{}", err), "something broke");
    }

    #[test]
    fn test_error_kind_display() {
        assert_eq!(format!("{}", ErrorKind::AmbiguousResult), "Ambiguous result");
        assert_eq!(
            format!("{}", ErrorKind::Extension("spatial".to_string())),
            "spatial error"
        );
    }

    #[test]
    fn test_error_from_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: DocketError = json_err.into();
        assert_eq!(err.kind(), &ErrorKind::ConversionError);
    }

    #[test]
    fn test_error_from_str() {
        let err: DocketError = "oops".into();
        assert_eq!(err.kind(), &ErrorKind::InternalError);
    }
}
