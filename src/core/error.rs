use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Query or count issued against a dataset that was never created.
    NotConfigured,
    NotFound,
    UnsupportedOperation,
    /// I/O or connection failure reported by the storage medium.
    Backend,
    CacheProvider,
    IndexInconsistency,
    /// A batch was only partly applied before the medium failed.
    PartialBatch { applied: usize, total: usize },
    Io,
    Parse,
    InvalidArgument,
}

#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context }
    }

    pub fn not_configured(dataset: &str) -> Self {
        Error::new(ErrorKind::NotConfigured, format!("dataset {} is not configured", dataset))
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, what.into())
    }

    pub fn unsupported(operation: &str) -> Self {
        Error::new(ErrorKind::UnsupportedOperation, format!("operation not supported: {}", operation))
    }

    pub fn backend(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Backend, context.into())
    }

    pub fn invalid_argument(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidArgument, context.into())
    }

    pub fn cache(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::CacheProvider, context.into())
    }

    pub fn partial_batch(applied: usize, total: usize, cause: Error) -> Self {
        Error::new(
            ErrorKind::PartialBatch { applied, total },
            format!("batch applied {}/{} before failure: {}", applied, total, cause),
        )
    }

    /// Failures of the medium itself. The engine never retries these.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Backend | ErrorKind::Io | ErrorKind::PartialBatch { .. }
        )
    }

    pub fn is_structural(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::NotConfigured | ErrorKind::NotFound | ErrorKind::UnsupportedOperation
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: err.to_string(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: format!("JSON error: {}", err),
        }
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error {
            kind: ErrorKind::InvalidArgument,
            context: format!("Invalid pattern: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_batch_is_retryable() {
        let err = Error::partial_batch(3, 10, Error::backend("connection reset"));
        assert!(err.is_retryable());
        assert!(!err.is_structural());
        assert_eq!(err.kind, ErrorKind::PartialBatch { applied: 3, total: 10 });
        assert!(err.to_string().contains("3/10"));
    }

    #[test]
    fn structural_errors_are_not_retryable() {
        for err in [
            Error::not_configured("blog"),
            Error::not_found("post1"),
            Error::unsupported("search"),
        ] {
            assert!(err.is_structural());
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err: Error = io.into();
        assert_eq!(err.kind, ErrorKind::Io);
    }
}
