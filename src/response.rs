//! The response side of a request.
//!
//! A [`ResponseWriter`] buffers the status and headers until the first body
//! chunk is written or the response is ended. At that point the head is handed
//! to the transport as a [`hyper::Response`] and later chunks are streamed
//! through its body.
use std::convert::{Infallible, TryFrom};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use futures_util::stream;
use hyper::body::Bytes;
use hyper::header::{self, AsHeaderName, HeaderMap, HeaderValue, IntoHeaderName};
use hyper::{Body, Response, StatusCode};
use tokio::sync::{mpsc, oneshot};

use crate::error::Error;

struct Inner {
    status: StatusCode,
    headers: HeaderMap,
    // `Some` until the head is committed
    head: Option<oneshot::Sender<Response<Body>>>,
    pending: Option<mpsc::UnboundedReceiver<Bytes>>,
    // `Some` until the response is ended
    body: Option<mpsc::UnboundedSender<Bytes>>,
}

impl Inner {
    fn commit(&mut self) {
        let (head, pending) = match (self.head.take(), self.pending.take()) {
            (Some(head), Some(pending)) => (head, pending),
            _ => return,
        };

        let body = Body::wrap_stream(stream::unfold(pending, |mut rx| async move {
            rx.recv().await.map(|chunk| (Ok::<_, Infallible>(chunk), rx))
        }));

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers.clone();

        tracing::trace!(status = %self.status, "response head committed");
        if head.send(response).is_err() {
            tracing::warn!("response head dropped, client is gone");
        }
    }

    fn send(&mut self, chunk: Bytes) -> Result<(), Error> {
        if self.body.is_none() {
            return Err(Error::Finished);
        }
        self.commit();

        let body = self.body.as_ref().ok_or(Error::Finished)?;
        if !chunk.is_empty() && body.send(chunk).is_err() {
            tracing::warn!("response body dropped, client is gone");
        }
        Ok(())
    }

    fn head_mut(&mut self) -> Result<&mut HeaderMap, Error> {
        if self.head.is_none() {
            return Err(Error::HeadersSent);
        }
        Ok(&mut self.headers)
    }
}

/// A cloneable handle to the response of one request.
#[derive(Clone)]
pub struct ResponseWriter {
    inner: Arc<Mutex<Inner>>,
}

/// Resolves to the response once its head has been committed by a [`ResponseWriter`].
pub struct PendingResponse {
    rx: oneshot::Receiver<Response<Body>>,
}

impl ResponseWriter {
    /// Creates a response with status `200 OK` and no headers.
    ///
    /// ```rust
    /// use httptools::ResponseWriter;
    /// use hyper::StatusCode;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), httptools::Error> {
    /// let (res, pending) = ResponseWriter::channel();
    /// res.send_text(StatusCode::CREATED, "created")?;
    ///
    /// let response = pending.await?;
    /// assert_eq!(response.status(), StatusCode::CREATED);
    /// # Ok(())
    /// # }
    /// ```
    pub fn channel() -> (ResponseWriter, PendingResponse) {
        let (head, rx) = oneshot::channel();
        let (body, pending) = mpsc::unbounded_channel();

        let inner = Inner {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            head: Some(head),
            pending: Some(pending),
            body: Some(body),
        };

        let writer = ResponseWriter {
            inner: Arc::new(Mutex::new(inner)),
        };
        (writer, PendingResponse { rx })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn status(&self) -> StatusCode {
        self.lock().status
    }

    pub fn set_status(&self, status: StatusCode) -> Result<(), Error> {
        let mut inner = self.lock();
        inner.head_mut()?;
        inner.status = status;
        Ok(())
    }

    pub fn header<K: AsHeaderName>(&self, key: K) -> Option<HeaderValue> {
        self.lock().headers.get(key).cloned()
    }

    /// Sets a header, replacing previous values under the same name.
    pub fn set_header<K, V>(&self, key: K, value: V) -> Result<(), Error>
    where
        K: IntoHeaderName,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<hyper::http::Error>,
    {
        let value = HeaderValue::try_from(value).map_err(|e| Error::InvalidHeader(e.into()))?;
        self.lock().head_mut()?.insert(key, value);
        Ok(())
    }

    /// Adds a header value, keeping previous values under the same name.
    pub fn append_header<K, V>(&self, key: K, value: V) -> Result<(), Error>
    where
        K: IntoHeaderName,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<hyper::http::Error>,
    {
        let value = HeaderValue::try_from(value).map_err(|e| Error::InvalidHeader(e.into()))?;
        self.lock().head_mut()?.append(key, value);
        Ok(())
    }

    pub fn remove_header<K: AsHeaderName>(&self, key: K) -> Result<(), Error> {
        self.lock().head_mut()?.remove(key);
        Ok(())
    }

    /// Whether the status and headers were already handed to the transport.
    pub fn headers_sent(&self) -> bool {
        self.lock().head.is_none()
    }

    /// Whether the response was ended.
    pub fn finished(&self) -> bool {
        self.lock().body.is_none()
    }

    /// Writes a body chunk, committing the head first if needed.
    ///
    /// Chunks are queued without a bound and never wait for the client to
    /// read them. A handler streaming a large body should pace its writes
    /// itself.
    pub fn write(&self, chunk: impl Into<Bytes>) -> Result<(), Error> {
        self.lock().send(chunk.into())
    }

    /// Writes a last chunk and ends the response.
    ///
    /// If nothing was written before and no `Content-Length` was set, the
    /// length of `chunk` is used, unless the status forbids a body.
    pub fn end(&self, chunk: impl Into<Bytes>) -> Result<(), Error> {
        let chunk = chunk.into();
        let mut inner = self.lock();

        if inner.body.is_none() {
            return Err(Error::Finished);
        }
        if inner.head.is_some()
            && allows_body(inner.status)
            && !inner.headers.contains_key(header::CONTENT_LENGTH)
        {
            inner
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(chunk.len()));
        }

        inner.send(chunk)?;
        inner.body = None;
        tracing::trace!("response finished");
        Ok(())
    }

    /// Ends the response without a last chunk.
    pub fn finish(&self) -> Result<(), Error> {
        self.end(Bytes::new())
    }

    /// Ends the response with a plain text body.
    pub fn send_text(&self, status: StatusCode, body: impl Into<Bytes>) -> Result<(), Error> {
        self.set_status(status)?;
        self.set_header(header::CONTENT_TYPE, "text/plain; charset=utf-8")?;
        self.set_header(header::X_CONTENT_TYPE_OPTIONS, "nosniff")?;
        self.end(body)
    }
}

fn allows_body(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

impl Future for PendingResponse {
    type Output = Result<Response<Body>, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|res| res.map_err(|_| Error::Closed))
    }
}
