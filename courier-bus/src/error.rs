//! Bus errors and the cause-preserving wrapper.
//!
//! Every layer between a handler and the request boundary may add context to
//! an error with [`wrap`] (or [`ResultExt::wrap_err`]). The innermost error,
//! usually one of the sentinels ([`Error::NotFound`], [`Error::Forbidden`],
//! [`Error::Conflict`], [`Error::Validation`]), stays reachable through
//! [`Error::cause`] no matter how many layers were added.
//!
//! ```rust
//! use courier_bus::{Error, ErrorKind, ResultExt, cause, wrap};
//!
//! let err = wrap(wrap(Error::NotFound, "loading user"), "creating session");
//! assert_eq!(err.to_string(), "creating session: loading user: not found");
//! assert!(matches!(cause(&err), Error::NotFound));
//!
//! let lookup: Result<(), Error> = Err(Error::Conflict);
//! let err = lookup.wrap_err("reserving subdomain").unwrap_err();
//! assert!(err.is(ErrorKind::Conflict));
//! ```

use std::error::Error as StdError;
use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// Result alias used throughout the bus.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced by the bus and by message handlers.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no handler registered for {0}")]
    NotRegistered(&'static str),

    #[error("handler already registered for {0}")]
    AlreadyRegistered(&'static str),

    #[error("registry is frozen, cannot register handler for {0}")]
    RegistryFrozen(&'static str),

    #[error("request context is not bound to a dispatcher")]
    Unbound,

    #[error("not found")]
    NotFound,

    #[error("forbidden")]
    Forbidden,

    #[error("conflict")]
    Conflict,

    #[error("validation failed")]
    Validation,

    #[error("context canceled")]
    Canceled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,

    #[error("{context}: {source}")]
    Wrapped {
        context: String,
        location: &'static Location<'static>,
        source: Box<Error>,
    },

    #[error("{0}")]
    Other(#[source] Box<dyn StdError + Send + Sync>),
}

impl Error {
    /// Box a foreign error as an unexpected failure.
    pub fn other<E>(error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Error::Other(error.into())
    }

    /// Add context to this error, keeping it as the cause.
    #[track_caller]
    pub fn wrap(self, context: impl Into<String>) -> Self {
        Error::Wrapped {
            context: context.into(),
            location: Location::caller(),
            source: Box::new(self),
        }
    }

    /// The innermost error of the wrap chain.
    ///
    /// An error that was never wrapped is its own cause.
    pub fn cause(&self) -> &Error {
        let mut current = self;
        while let Error::Wrapped { source, .. } = current {
            current = source.as_ref();
        }
        current
    }

    /// Classification of the innermost error.
    pub fn kind(&self) -> ErrorKind {
        match self.cause() {
            Error::NotRegistered(_) => ErrorKind::NotRegistered,
            Error::AlreadyRegistered(_) => ErrorKind::AlreadyRegistered,
            Error::RegistryFrozen(_) => ErrorKind::RegistryFrozen,
            Error::Unbound => ErrorKind::Unbound,
            Error::NotFound => ErrorKind::NotFound,
            Error::Forbidden => ErrorKind::Forbidden,
            Error::Conflict => ErrorKind::Conflict,
            Error::Validation => ErrorKind::Validation,
            Error::Canceled => ErrorKind::Canceled,
            Error::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            Error::Other(_) | Error::Wrapped { .. } => ErrorKind::Unexpected,
        }
    }

    /// Test the cause against a kind, ignoring any wrapping.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == kind
    }

    /// Shorthand for `self.kind().class()`.
    pub fn class(&self) -> ErrorClass {
        self.kind().class()
    }

    /// Source location of the outermost wrap, if any.
    pub fn location(&self) -> Option<&'static Location<'static>> {
        match self {
            Error::Wrapped { location, .. } => Some(*location),
            _ => None,
        }
    }

    /// Iterate the chain from this error down to its cause.
    pub fn chain(&self) -> Chain<'_> {
        Chain {
            next: Some(self),
        }
    }
}

/// Iterator over the layers of a wrapped error.
pub struct Chain<'a> {
    next: Option<&'a Error>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = &'a Error;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = match current {
            Error::Wrapped { source, .. } => Some(source.as_ref()),
            _ => None,
        };
        Some(current)
    }
}

/// Wrap `cause` with a context message.
#[track_caller]
pub fn wrap(cause: impl Into<Error>, message: impl Into<String>) -> Error {
    cause.into().wrap(message)
}

/// Walk the wrap chain of `err` to its innermost error.
pub fn cause(err: &Error) -> &Error {
    err.cause()
}

/// Context adapters for results carrying a bus error.
pub trait ResultExt<T> {
    /// Wrap the error, if any, with a fixed message.
    fn wrap_err(self, context: impl Into<String>) -> Result<T>;

    /// Wrap the error, if any, with a lazily built message.
    fn wrap_err_with<C, F>(self, context: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    #[track_caller]
    fn wrap_err(self, context: impl Into<String>) -> Result<T> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => Err(err.into().wrap(context)),
        }
    }

    #[track_caller]
    fn wrap_err_with<C, F>(self, context: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        match self {
            Ok(value) => Ok(value),
            Err(err) => Err(err.into().wrap(context())),
        }
    }
}

/// Flat classification of an error's cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotRegistered,
    AlreadyRegistered,
    RegistryFrozen,
    Unbound,
    NotFound,
    Forbidden,
    Conflict,
    Validation,
    Canceled,
    DeadlineExceeded,
    Unexpected,
}

/// Severity class of an error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Wiring mistakes: missing or duplicate handlers. Fatal, logged loudly.
    Configuration,
    /// Expected outcomes the caller translates for the client.
    Domain,
    /// The request was canceled or ran out of time.
    Cancellation,
    /// Anything uncategorized.
    Unexpected,
}

impl ErrorKind {
    pub fn class(self) -> ErrorClass {
        match self {
            ErrorKind::NotRegistered
            | ErrorKind::AlreadyRegistered
            | ErrorKind::RegistryFrozen
            | ErrorKind::Unbound => ErrorClass::Configuration,
            ErrorKind::NotFound
            | ErrorKind::Forbidden
            | ErrorKind::Conflict
            | ErrorKind::Validation => ErrorClass::Domain,
            ErrorKind::Canceled | ErrorKind::DeadlineExceeded => ErrorClass::Cancellation,
            ErrorKind::Unexpected => ErrorClass::Unexpected,
        }
    }

    /// HTTP status the request boundary should answer with.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::Forbidden => 403,
            ErrorKind::Conflict => 409,
            ErrorKind::Validation => 422,
            // nginx's "client closed request"
            ErrorKind::Canceled => 499,
            ErrorKind::DeadlineExceeded => 504,
            ErrorKind::NotRegistered
            | ErrorKind::AlreadyRegistered
            | ErrorKind::RegistryFrozen
            | ErrorKind::Unbound
            | ErrorKind::Unexpected => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotRegistered => "not_registered",
            ErrorKind::AlreadyRegistered => "already_registered",
            ErrorKind::RegistryFrozen => "registry_frozen",
            ErrorKind::Unbound => "unbound",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validation => "validation",
            ErrorKind::Canceled => "canceled",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Configuration => "configuration",
            ErrorClass::Domain => "domain",
            ErrorClass::Cancellation => "cancellation",
            ErrorClass::Unexpected => "unexpected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_unwrapped_error_is_its_own_cause() {
        let err = Error::NotFound;
        assert!(matches!(err.cause(), Error::NotFound));
        assert!(err.location().is_none());
    }

    #[test]
    fn test_cause_survives_any_depth() {
        for depth in 0..8 {
            let mut err = Error::Forbidden;
            for layer in 0..depth {
                err = wrap(err, format!("layer {}", layer));
            }
            assert!(matches!(cause(&err), Error::Forbidden), "depth {}", depth);
            assert_eq!(err.chain().count(), depth + 1);
        }
    }

    #[test]
    fn test_wrap_is_associative() {
        let left = wrap(wrap(Error::Conflict, "a"), "b");
        let right = Error::Conflict.wrap("a").wrap("b");
        assert_eq!(left.to_string(), right.to_string());
        assert!(matches!(left.cause(), Error::Conflict));
        assert!(matches!(right.cause(), Error::Conflict));
    }

    #[test]
    fn test_display_includes_every_layer() {
        let err = wrap(wrap(Error::NotFound, "user x@example.com"), "sign in");
        assert_eq!(err.to_string(), "sign in: user x@example.com: not found");
    }

    #[test]
    fn test_wrap_records_caller_location() {
        let err = wrap(Error::Validation, "bad input");
        let location = err.location().unwrap();
        assert!(location.file().ends_with("error.rs"));
    }

    #[test]
    fn test_result_ext() {
        let ok: Result<u8> = Ok(1);
        assert_eq!(ok.wrap_err("unused").unwrap(), 1);

        let failed: Result<u8> = Err(Error::NotFound);
        let err = failed.wrap_err_with(|| format!("tenant {}", 7)).unwrap_err();
        assert_eq!(err.to_string(), "tenant 7: not found");
        assert!(err.is(ErrorKind::NotFound));
    }

    #[test]
    fn test_foreign_errors_are_unexpected() {
        let io = io::Error::new(io::ErrorKind::Other, "disk on fire");
        let err = Error::other(io).wrap("saving tenant");

        assert_eq!(err.kind(), ErrorKind::Unexpected);
        assert_eq!(err.class(), ErrorClass::Unexpected);
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "saving tenant: disk on fire");
    }

    #[test]
    fn test_source_chain_reaches_cause() {
        let err = wrap(wrap(Error::Conflict, "inner"), "outer");
        let inner = err.source().unwrap();
        assert_eq!(inner.to_string(), "inner: conflict");
        let root = inner.source().unwrap();
        assert_eq!(root.to_string(), "conflict");
        assert!(root.source().is_none());
    }

    #[test]
    fn test_classes() {
        assert_eq!(ErrorKind::NotRegistered.class(), ErrorClass::Configuration);
        assert_eq!(ErrorKind::AlreadyRegistered.class(), ErrorClass::Configuration);
        assert_eq!(ErrorKind::Unbound.class(), ErrorClass::Configuration);
        assert_eq!(ErrorKind::NotFound.class(), ErrorClass::Domain);
        assert_eq!(ErrorKind::Validation.class(), ErrorClass::Domain);
        assert_eq!(ErrorKind::Canceled.class(), ErrorClass::Cancellation);
        assert_eq!(ErrorKind::DeadlineExceeded.class(), ErrorClass::Cancellation);
        assert_eq!(ErrorKind::Unexpected.class(), ErrorClass::Unexpected);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::NotFound.wrap("x").kind().status_code(), 404);
        assert_eq!(ErrorKind::Forbidden.status_code(), 403);
        assert_eq!(ErrorKind::Conflict.status_code(), 409);
        assert_eq!(ErrorKind::Validation.status_code(), 422);
        assert_eq!(ErrorKind::DeadlineExceeded.status_code(), 504);
        assert_eq!(ErrorKind::NotRegistered.status_code(), 500);
    }
}
