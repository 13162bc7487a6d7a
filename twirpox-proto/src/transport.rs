//! The client dispatcher doesn't do any networking itself.  It hands fully-formed HTTP requests to
//! an [`HttpTransport`] and interprets whatever comes back.
//!
//! The transport that actually talks to the network lives in `twirpox-client`.  This crate ships
//! the two that need nothing but this crate: a closure, for tests, and a [`Server`] itself, which
//! lets a client call straight into an in-process server.
use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;

use crate::Server;

/// Something that can carry one HTTP request to a server and bring back its response.
///
/// Any HTTP response, including error statuses, is a successful send.  `Err` means the request
/// never produced a response at all (connection refused, timeout, etc).
pub trait HttpTransport: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn send(
        &self,
        request: http::Request<Bytes>,
    ) -> impl Future<Output = Result<http::Response<Bytes>, Self::Error>> + Send;
}

impl<T: HttpTransport> HttpTransport for Arc<T> {
    type Error = T::Error;

    fn send(
        &self,
        request: http::Request<Bytes>,
    ) -> impl Future<Output = Result<http::Response<Bytes>, Self::Error>> + Send {
        (**self).send(request)
    }
}

/// Transport backed by an async closure.  See [`transport_fn`].
#[derive(Clone)]
pub struct TransportFn<F> {
    f: F,
}

/// Wrap an async closure taking the request and returning the response as a transport.
///
/// Mostly useful in tests, to play the part of a misbehaving server or proxy.
pub fn transport_fn<F, Fut, E>(f: F) -> TransportFn<F>
where
    F: Fn(http::Request<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<http::Response<Bytes>, E>> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    TransportFn { f }
}

impl<F, Fut, E> HttpTransport for TransportFn<F>
where
    F: Fn(http::Request<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<http::Response<Bytes>, E>> + Send,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;

    fn send(
        &self,
        request: http::Request<Bytes>,
    ) -> impl Future<Output = Result<http::Response<Bytes>, Self::Error>> + Send {
        (self.f)(request)
    }
}

/// Loopback: the request is dispatched by the server without ever leaving the process.
impl<S: Clone + Send + Sync + 'static> HttpTransport for Server<S> {
    type Error = Infallible;

    fn send(
        &self,
        request: http::Request<Bytes>,
    ) -> impl Future<Output = Result<http::Response<Bytes>, Self::Error>> + Send {
        let server = self.clone();

        async move { Ok(server.handle(request).await) }
    }
}
