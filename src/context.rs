//! Per-request storage.
//!
//! A [`Context`] is created lazily for a request and kept in the request's
//! extensions, so it is released together with the request. Nothing else in
//! the crate holds on to it once dispatch is over.
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use hyper::Request;

use crate::params::Params;

/// The context key under which the router stores the matched [`Params`].
pub const PARAMS_KEY: &str = "params";

type Map = HashMap<String, Box<dyn Any + Send + Sync>>;

/// A handle to the key-value storage of one request.
///
/// Cloning the handle does not copy the storage.
#[derive(Clone, Default)]
pub struct Context {
    inner: Arc<Mutex<Map>>,
}

impl Context {
    fn lock(&self) -> MutexGuard<'_, Map> {
        // a handler panicking while holding the lock leaves the map usable
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn insert<T>(&self, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.lock().insert(key.into(), Box::new(value));
    }

    /// Returns a copy of the value stored under `key` if it has type `T`.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Any + Clone,
    {
        self.lock()
            .get(key)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// Removes the value under `key`, returning whether there was one.
    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// The parameters of the matched route.
    pub fn params(&self) -> Option<Params> {
        self.get(PARAMS_KEY)
    }

    /// Creates a handle that does not keep the storage alive.
    pub fn downgrade(&self) -> WeakContext {
        WeakContext {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both handles refer to the same storage.
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.lock().keys()).finish()
    }
}

/// A non-owning handle to a [`Context`].
#[derive(Clone, Debug)]
pub struct WeakContext {
    inner: Weak<Mutex<Map>>,
}

impl WeakContext {
    /// Returns the context if its request, or another strong handle, is still alive.
    pub fn upgrade(&self) -> Option<Context> {
        self.inner.upgrade().map(|inner| Context { inner })
    }
}

/// Returns the context of `req`, creating an empty one on first access.
///
/// ```rust
/// use httptools::context_for;
/// use hyper::{Body, Request};
///
/// let mut req = Request::new(Body::empty());
/// context_for(&mut req).insert("user", String::from("ferris"));
///
/// let user: Option<String> = context_for(&mut req).get("user");
/// assert_eq!(user.as_deref(), Some("ferris"));
/// ```
pub fn context_for<B>(req: &mut Request<B>) -> Context {
    if let Some(context) = req.extensions().get::<Context>() {
        return context.clone();
    }

    let context = Context::default();
    req.extensions_mut().insert(context.clone());
    context
}

/// Read access to the context of a request that went through the router.
pub trait RequestExt {
    /// The context of the request, if one was created.
    fn context(&self) -> Option<Context>;

    /// The parameters of the matched route.
    fn params(&self) -> Option<Params>;

    /// A single parameter of the matched route.
    fn param(&self, key: &str) -> Option<String>;
}

impl<B> RequestExt for Request<B> {
    fn context(&self) -> Option<Context> {
        self.extensions().get::<Context>().cloned()
    }

    fn params(&self) -> Option<Params> {
        self.context()?.params()
    }

    fn param(&self, key: &str) -> Option<String> {
        self.params()?.get(key).map(str::to_owned)
    }
}
