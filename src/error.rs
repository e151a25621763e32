use std::convert::Infallible;

use hyper::http::method::InvalidMethod;
use thiserror::Error;

/// A boxed error returned by request handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced while registering routes, dispatching requests or writing responses.
#[derive(Debug, Error)]
pub enum Error {
    /// A route pattern could not be compiled. Raised by
    /// [`RouterBuilder::build`](crate::RouterBuilder::build), before any request is served.
    #[error("malformed route pattern `{pattern}`: {reason}")]
    MalformedPattern { pattern: String, reason: String },

    /// A route was registered with an invalid method name.
    #[error("invalid route method: {0}")]
    InvalidMethod(#[from] InvalidMethod),

    /// A handler returned an error.
    #[error("handler failed: {0}")]
    Handler(#[source] BoxError),

    /// A handler panicked.
    #[error("handler panicked: {0}")]
    Panic(String),

    /// The response head was already written to the transport.
    #[error("response headers already sent")]
    HeadersSent,

    /// The response was already ended.
    #[error("response already finished")]
    Finished,

    /// A header name or value was rejected.
    #[error("invalid header: {0}")]
    InvalidHeader(#[from] hyper::http::Error),

    /// The response was dropped before its head was written.
    #[error("response dropped before its head was sent")]
    Closed,
}

impl From<Infallible> for Error {
    fn from(never: Infallible) -> Self {
        match never {}
    }
}

impl Error {
    pub(crate) fn malformed(pattern: &str, reason: impl ToString) -> Self {
        Error::MalformedPattern {
            pattern: pattern.to_owned(),
            reason: reason.to_string(),
        }
    }
}
