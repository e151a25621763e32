//! # httptools
//!
//! httptools is a minimal HTTP request router for [hyper](https://hyper.rs).
//!
//! It matches the method and path of each request against an ordered table of
//! route patterns, stores the captured path parameters in a per-request
//! context and runs the selected handler inside a single error boundary.
//!
//! ## Features
//!
//! **Registration order is precedence:** routes are tried in the order they
//! were registered and the first match wins. Duplicate or shadowed patterns are
//! allowed; there are no priority rules to learn.
//!
//! **Path parameters:** `{name}` captures one path segment, `*` captures the
//! rest of the path. Captured values are percent-decoded. A precompiled
//! [`regex::Regex`] can be registered instead of a pattern for anything else.
//!
//! **Per-request context:** parameters and any state a handler wants to keep
//! live in a [`Context`] attached to the request, dropped with it.
//!
//! **One error boundary:** handler errors and panics are passed to a
//! configurable error handler. The default one logs the error and answers
//! `500 Internal Server Error` if the response has not started yet. A
//! response is never left unfinished.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use httptools::{RequestExt, ResponseWriter, Router};
//! use hyper::{Body, Request, StatusCode};
//!
//! async fn hello(req: Request<Body>, res: ResponseWriter) -> Result<(), httptools::Error> {
//!     let name = req.param("name").unwrap_or_default();
//!     res.send_text(StatusCode::OK, format!("Hello, {}!", name))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let router = Router::builder()
//!         .prefix("/api")
//!         .get("/hello/{name}", hello)
//!         .build()?;
//!
//!     hyper::Server::bind(&([127, 0, 0, 1], 3000).into())
//!         .serve(router.into_service())
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! Logging goes through [`tracing`]; install a subscriber to see route
//! registration, match results and handler failures.
#![forbid(unsafe_code)]

mod context;
mod error;
mod params;
pub mod path;
mod pattern;
mod response;

#[doc(hidden)]
pub mod router;

#[doc(inline)]
pub use context::{context_for, Context, RequestExt, WeakContext, PARAMS_KEY};
#[doc(inline)]
pub use error::{BoxError, Error};
#[doc(inline)]
pub use params::{Param, Params};
#[doc(inline)]
pub use pattern::{IntoPattern, Pattern};
#[doc(inline)]
pub use response::{PendingResponse, ResponseWriter};
#[doc(inline)]
pub use router::{Handler, Match, MethodFilter, RequestInfo, Route, Router, RouterBuilder};

// test the code examples in README.md
#[cfg(doctest)]
mod test_readme {
    macro_rules! doc_comment {
        ($x:expr) => {
            #[doc = $x]
            extern "C" {}
        };
    }

    doc_comment!(include_str!("../README.md"));
}
