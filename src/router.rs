//! [`Router`](crate::Router) dispatches requests to handlers through an ordered route table.
//!
//! Routes are matched in the order they were registered and the first route
//! whose method and pattern match the request wins. There is no other
//! precedence rule: given `/{x}` and then `/fixed`, a request to `/fixed` is
//! handled by the `/{x}` route.
//!
//! ```rust,no_run
//! use httptools::{RequestExt, ResponseWriter, Router};
//! use hyper::{Body, Request, StatusCode};
//!
//! async fn index(_: Request<Body>, res: ResponseWriter) -> Result<(), httptools::Error> {
//!     res.send_text(StatusCode::OK, "Hello, World!")
//! }
//!
//! async fn hello(req: Request<Body>, res: ResponseWriter) -> Result<(), httptools::Error> {
//!     let name = req.param("name").unwrap_or_default();
//!     res.send_text(StatusCode::OK, format!("Hello, {}!", name))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let router = Router::builder()
//!         .get("/", index)
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
//! Each request goes through these steps:
//!
//!  1) If a prefix is configured and the path starts with it on a segment
//!     boundary, the prefix is stripped. The handler then sees the stripped path.
//!  2) The path is percent-decoded, except for `%2F` and `%25`.
//!  3) The route table is scanned; the captures of the first match are
//!     percent-decoded and stored in the request's [`Context`] under
//!     [`PARAMS_KEY`](crate::PARAMS_KEY).
//!  4) The matched handler, or the not-found handler, runs inside an error
//!     boundary. Errors and panics go to the error handler, and a response
//!     still unfinished afterwards is ended.
use std::any::Any;
use std::convert::{Infallible, TryFrom, TryInto};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use futures_util::future::{self, BoxFuture, FutureExt};
use hyper::header::{self, HeaderMap};
use hyper::http::method::InvalidMethod;
use hyper::service::Service;
use hyper::{Body, Method, Request, Response, StatusCode, Uri};

use crate::context::{context_for, Context, PARAMS_KEY};
use crate::error::{BoxError, Error};
use crate::params::Params;
use crate::path;
use crate::pattern::{IntoPattern, Pattern};
use crate::response::{PendingResponse, ResponseWriter};

/// The methods a route answers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodFilter {
    /// Any method, written `*`.
    Any,
    Only(Method),
}

impl MethodFilter {
    pub fn allows(&self, method: &Method) -> bool {
        match self {
            MethodFilter::Any => true,
            MethodFilter::Only(m) => m == method,
        }
    }
}

impl From<Method> for MethodFilter {
    fn from(method: Method) -> Self {
        MethodFilter::Only(method)
    }
}

impl FromStr for MethodFilter {
    type Err = InvalidMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "*" => Ok(MethodFilter::Any),
            method => method.parse().map(MethodFilter::Only),
        }
    }
}

impl TryFrom<&str> for MethodFilter {
    type Error = InvalidMethod;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl fmt::Display for MethodFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodFilter::Any => f.write_str("*"),
            MethodFilter::Only(method) => f.write_str(method.as_str()),
        }
    }
}

/// Represents a HTTP handler function.
///
/// A handler writes its response through the [`ResponseWriter`] it is given.
/// This trait is implemented for functions taking the request and the writer
/// and returning a future of `Result<(), E>`:
/// ```rust
/// # use httptools::{Handler, ResponseWriter};
/// # use hyper::{Body, Request, StatusCode};
/// async fn teapot(_: Request<Body>, res: ResponseWriter) -> Result<(), httptools::Error> {
///     res.send_text(StatusCode::IM_A_TEAPOT, "I am a teapot!")
/// }
///
/// let handler: Box<dyn Handler> = Box::new(teapot);
/// ```
pub trait Handler: Send + Sync + 'static {
    fn call(&self, req: Request<Body>, res: ResponseWriter) -> BoxFuture<'static, Result<(), BoxError>>;
}

impl<F, R, E> Handler for F
where
    F: Fn(Request<Body>, ResponseWriter) -> R + Send + Sync + 'static,
    R: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError>,
{
    fn call(&self, req: Request<Body>, res: ResponseWriter) -> BoxFuture<'static, Result<(), BoxError>> {
        self(req, res).map(|result| result.map_err(Into::into)).boxed()
    }
}

type ErrorHandler = dyn Fn(Error, &RequestInfo, &ResponseWriter) + Send + Sync;

/// What the error handler gets to know about the failed request.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    context: Context,
}

impl RequestInfo {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn context(&self) -> &Context {
        &self.context
    }
}

/// A registered route.
pub struct Route {
    method: MethodFilter,
    pattern: Pattern,
    handler: Box<dyn Handler>,
}

impl Route {
    pub fn method(&self) -> &MethodFilter {
        &self.method
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

/// The route selected for a request, with its decoded parameters.
#[derive(Debug)]
pub struct Match<'r> {
    pub route: &'r Route,
    pub params: Params,
}

/// Collects routes and settings for a [`Router`].
#[derive(Default)]
pub struct RouterBuilder {
    routes: Vec<Route>,
    error: Option<Error>,
    prefix: Option<String>,
    not_found: Option<Box<dyn Handler>>,
    error_handler: Option<Box<ErrorHandler>>,
}

impl RouterBuilder {
    /// Appends a route for a specific method to the route table.
    ///
    /// `method` is a [`Method`], a [`MethodFilter`] or a method name, where
    /// `"*"` matches every method. An invalid method name or a pattern that
    /// fails to compile is reported by [`build`](RouterBuilder::build).
    /// ```rust
    /// use httptools::{MethodFilter, ResponseWriter, Router};
    /// use hyper::{Body, Method, Request, StatusCode};
    ///
    /// let router = Router::builder()
    ///     .handle(Method::GET, "/teapot", |_: Request<Body>, res: ResponseWriter| async move {
    ///         res.send_text(StatusCode::IM_A_TEAPOT, "I am a teapot!")
    ///     })
    ///     .handle(MethodFilter::Any, "/anything", |_: Request<Body>, res: ResponseWriter| async move {
    ///         res.finish()
    ///     })
    ///     .handle("*", "/everything", |_: Request<Body>, res: ResponseWriter| async move {
    ///         res.finish()
    ///     })
    ///     .build()
    ///     .unwrap();
    ///
    /// assert_eq!(router.routes().len(), 3);
    /// ```
    pub fn handle<M>(mut self, method: M, pattern: impl IntoPattern, handler: impl Handler) -> Self
    where
        M: TryInto<MethodFilter>,
        <M as TryInto<MethodFilter>>::Error: Into<Error>,
    {
        let method = match method.try_into() {
            Ok(method) => method,
            Err(err) => {
                let err = err.into();
                tracing::debug!(error = %err, "route rejected");
                self.error.get_or_insert(err);
                return self;
            }
        };
        match pattern.into_pattern() {
            Ok(pattern) => {
                tracing::debug!(method = %method, pattern = pattern.as_str(), "route registered");
                self.routes.push(Route {
                    method,
                    pattern,
                    handler: Box::new(handler),
                });
            }
            Err(err) => {
                tracing::debug!(method = %method, error = %err, "route rejected");
                self.error.get_or_insert(err);
            }
        }
        self
    }

    /// Register a handler for any method
    pub fn any(self, pattern: impl IntoPattern, handler: impl Handler) -> Self {
        self.handle(MethodFilter::Any, pattern, handler)
    }

    /// Register a handler for `GET` requests
    pub fn get(self, pattern: impl IntoPattern, handler: impl Handler) -> Self {
        self.handle(Method::GET, pattern, handler)
    }

    /// Register a handler for `HEAD` requests
    pub fn head(self, pattern: impl IntoPattern, handler: impl Handler) -> Self {
        self.handle(Method::HEAD, pattern, handler)
    }

    /// Register a handler for `OPTIONS` requests
    pub fn options(self, pattern: impl IntoPattern, handler: impl Handler) -> Self {
        self.handle(Method::OPTIONS, pattern, handler)
    }

    /// Register a handler for `POST` requests
    pub fn post(self, pattern: impl IntoPattern, handler: impl Handler) -> Self {
        self.handle(Method::POST, pattern, handler)
    }

    /// Register a handler for `PUT` requests
    pub fn put(self, pattern: impl IntoPattern, handler: impl Handler) -> Self {
        self.handle(Method::PUT, pattern, handler)
    }

    /// Register a handler for `PATCH` requests
    pub fn patch(self, pattern: impl IntoPattern, handler: impl Handler) -> Self {
        self.handle(Method::PATCH, pattern, handler)
    }

    /// Register a handler for `DELETE` requests
    pub fn delete(self, pattern: impl IntoPattern, handler: impl Handler) -> Self {
        self.handle(Method::DELETE, pattern, handler)
    }

    /// A path prefix removed from request paths before matching.
    /// For example with the prefix `/api`, a request to `/api/users` is matched
    /// against `/users`. Paths without the prefix are matched unchanged.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Configurable handler which is called when no matching route is
    /// found. By default it responds with `404 Not Found`.
    pub fn not_found(mut self, handler: impl Handler) -> Self {
        self.not_found = Some(Box::new(handler));
        self
    }

    /// Configurable handler which is called when a handler fails or panics.
    ///
    /// By default the error is logged and, unless the response was already
    /// under way, answered with `500 Internal Server Error`.
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(Error, &RequestInfo, &ResponseWriter) + Send + Sync + 'static,
    {
        self.error_handler = Some(Box::new(handler));
        self
    }

    /// Finishes the route table. Fails with the first pattern that did not compile.
    pub fn build(self) -> Result<Router, Error> {
        if let Some(err) = self.error {
            return Err(err);
        }

        Ok(Router {
            routes: self.routes,
            prefix: self.prefix.filter(|p| !p.trim_end_matches('/').is_empty()),
            not_found: self
                .not_found
                .unwrap_or_else(|| Box::new(default_not_found)),
            error_handler: self
                .error_handler
                .unwrap_or_else(|| Box::new(default_error_handler)),
        })
    }
}

/// Router dispatches requests to different handlers via configurable routes.
///
/// A router is immutable once built.
pub struct Router {
    routes: Vec<Route>,
    prefix: Option<String>,
    not_found: Box<dyn Handler>,
    error_handler: Box<ErrorHandler>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::default()
    }

    /// The route table in registration order.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Lookup allows the manual lookup of the route a request would be dispatched to.
    /// ```rust
    /// use httptools::{ResponseWriter, Router};
    /// use hyper::{Body, Method, Request};
    ///
    /// let router = Router::builder()
    ///     .get("/users/{id}", |_: Request<Body>, res: ResponseWriter| async move { res.finish() })
    ///     .build()
    ///     .unwrap();
    ///
    /// let found = router.lookup(&Method::GET, "/users/42").unwrap();
    /// assert_eq!(found.params.get("id"), Some("42"));
    /// assert!(router.lookup(&Method::POST, "/users/42").is_none());
    /// ```
    pub fn lookup(&self, method: &Method, path: impl AsRef<str>) -> Option<Match<'_>> {
        let path = path.as_ref();
        self.resolve(method, self.strip_prefix(path).unwrap_or(path))
    }

    fn strip_prefix<'p>(&self, path: &'p str) -> Option<&'p str> {
        path::strip_prefix(self.prefix.as_deref()?, path)
    }

    fn resolve(&self, method: &Method, path: &str) -> Option<Match<'_>> {
        let path = path::normalize(path);

        self.routes
            .iter()
            .filter(|route| route.method.allows(method))
            .find_map(|route| {
                let params = route.pattern.captures(&path)?;
                match params.decode() {
                    Some(params) => Some(Match { route, params }),
                    None => {
                        tracing::debug!(
                            pattern = route.pattern.as_str(),
                            "skipping route, capture is not valid UTF-8"
                        );
                        None
                    }
                }
            })
    }

    /// Dispatches one request. Handler failures are reported to the error
    /// handler and never returned to the caller. When this returns, the
    /// response is finished.
    pub async fn dispatch(&self, mut req: Request<Body>, res: ResponseWriter) {
        let context = context_for(&mut req);
        let method = req.method().clone();
        let raw_path = req.uri().path().to_owned();

        let stripped = self.strip_prefix(&raw_path);
        if let Some(path) = stripped {
            match replace_path(req.uri(), path) {
                Some(uri) => *req.uri_mut() = uri,
                None => tracing::debug!(path = %raw_path, "could not rewrite request uri"),
            }
        }

        let handler: &dyn Handler = match self.resolve(&method, stripped.unwrap_or(raw_path.as_str())) {
            Some(found) => {
                tracing::debug!(
                    method = %method,
                    path = %raw_path,
                    pattern = found.route.pattern.as_str(),
                    "route matched"
                );
                context.insert(PARAMS_KEY, found.params);
                &*found.route.handler
            }
            None => {
                tracing::debug!(method = %method, path = %raw_path, "no route matched");
                &*self.not_found
            }
        };

        let info = RequestInfo {
            method,
            uri: req.uri().clone(),
            headers: req.headers().clone(),
            context,
        };

        let writer = res.clone();
        let outcome = AssertUnwindSafe(async move { handler.call(req, writer).await })
            .catch_unwind()
            .await;

        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(Error::Handler(err)),
            Err(payload) => Some(Error::Panic(panic_message(payload))),
        };

        if let Some(error) = error {
            let handled = panic::catch_unwind(AssertUnwindSafe(|| {
                (self.error_handler)(error, &info, &res)
            }));

            if handled.is_err() {
                tracing::error!(method = %info.method, uri = %info.uri, "error handler panicked");
                respond_internal_error(&res);
            }
        }

        if !res.finished() {
            tracing::trace!(method = %info.method, uri = %info.uri, "ending unfinished response");
            if let Err(err) = res.finish() {
                tracing::warn!(error = %err, "could not end response");
            }
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes)
            .field("prefix", &self.prefix)
            .finish()
    }
}

fn replace_path(uri: &Uri, path: &str) -> Option<Uri> {
    let path_and_query = match uri.query() {
        Some(query) => format!("{}?{}", path, query),
        None => path.to_owned(),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse().ok()?);
    Uri::from_parts(parts).ok()
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        String::from("unknown panic payload")
    }
}

fn default_not_found(_: Request<Body>, res: ResponseWriter) -> future::Ready<Result<(), Error>> {
    future::ready(res.send_text(StatusCode::NOT_FOUND, "Not Found"))
}

fn default_error_handler(err: Error, info: &RequestInfo, res: &ResponseWriter) {
    tracing::error!(method = %info.method, uri = %info.uri, error = %err, "request failed");
    respond_internal_error(res);
}

fn respond_internal_error(res: &ResponseWriter) {
    if let Err(err) = write_internal_error(res) {
        tracing::warn!(error = %err, "could not write error response");
    }
}

// The head may only be written while it has not been sent, and the body
// only extended while the response is not finished.
fn write_internal_error(res: &ResponseWriter) -> Result<(), Error> {
    if !res.headers_sent() {
        res.set_status(StatusCode::INTERNAL_SERVER_ERROR)?;
        res.remove_header(header::CONTENT_LENGTH)?;
        res.set_header(header::CONTENT_TYPE, "text/plain; charset=utf-8")?;
        res.set_header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")?;
    }
    if !res.finished() {
        res.end("Internal Server Error")?;
    }
    Ok(())
}

#[doc(hidden)]
pub struct MakeRouterService(RouterService);

impl<T> Service<T> for MakeRouterService {
    type Response = RouterService;
    type Error = Infallible;
    type Future = future::Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _: T) -> Self::Future {
        future::ok(self.0.clone())
    }
}

#[doc(hidden)]
#[derive(Clone)]
pub struct RouterService(Arc<Router>);

impl Service<Request<Body>> for RouterService {
    type Response = Response<Body>;
    type Error = Error;
    type Future = PendingResponse;

    fn poll_ready(&mut self, _: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        self.0.serve(req)
    }
}

impl Router {
    /// Converts the `Router` into a `Service` which you can serve directly with `Hyper`.
    /// If you have an existing `Service` that you want to incorporate a `Router` into, see
    /// [`Router::serve`](crate::Router::serve).
    pub fn into_service(self) -> MakeRouterService {
        MakeRouterService(RouterService(Arc::new(self)))
    }

    /// Dispatches `req` on the current tokio runtime and resolves as soon as
    /// the response head is written; the body keeps streaming afterwards.
    /// ```rust,no_run
    /// # use httptools::Router;
    /// # use hyper::service::{make_service_fn, service_fn};
    /// # use hyper::{Request, Body, Server};
    /// # use std::convert::Infallible;
    /// # use std::sync::Arc;
    /// # async fn run() {
    /// let router = Arc::new(Router::builder().build().unwrap());
    ///
    /// let make_svc = make_service_fn(move |_| {
    ///     let router = router.clone();
    ///     async move {
    ///         Ok::<_, Infallible>(service_fn(move |req: Request<Body>| router.serve(req)))
    ///     }
    /// });
    ///
    /// let server = Server::bind(&([127, 0, 0, 1], 3000).into())
    ///     .serve(make_svc)
    ///     .await;
    /// # }
    /// ```
    pub fn serve(self: &Arc<Self>, req: Request<Body>) -> PendingResponse {
        let (res, pending) = ResponseWriter::channel();
        let router = Arc::clone(self);

        tokio::spawn(async move { router.dispatch(req, res).await });
        pending
    }
}
