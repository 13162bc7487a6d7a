//! Per-call side-channel for transport-level information.
//!
//! Messages are plain data and never carry HTTP headers themselves.  Instead each call gets a
//! [`Context`]: the server makes one for every inbound request, and a client call uses the one the
//! caller passes in (or a fresh one).  Request and response headers are attached to the context,
//! and anything that has a handle to it can look them up until the last clone is dropped at the
//! end of the call.
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::{ContentType, RouteComponents};

/// Headers that came with a request (server side) or that will be sent with one (client side).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestMetadata(pub HeaderMap);

/// Headers that will be sent with a response (server side) or that came with one (client side).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResponseMetadata(pub HeaderMap);

/// Values keyed by their type.
///
/// The context uses this so that it can carry metadata and other per-call values without this
/// crate fixing _a priori_ what they are.
#[derive(Default)]
pub(crate) struct Extensions {
    map: HashMap<TypeId, Box<dyn Any + Send + Sync + 'static>>,
}

impl Extensions {
    /// Insert a value, replacing any existing value of the same type.
    pub(crate) fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.map.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns `None` if no value of type `T` is present.
    pub(crate) fn get<T: 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref())
    }

    /// Get the value of type `T`, inserting the result of `default` first if there is none.
    pub(crate) fn get_or_insert_with<T: Send + Sync + 'static>(&mut self, default: impl FnOnce() -> T) -> &mut T {
        self.map
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(default()))
            .downcast_mut()
            .expect("BUG: extension stored under the wrong TypeId")
    }
}

/// The scope of a single call.
///
/// Cloning is cheap and all clones share the same contents, so a handler can hold on to the
/// context while the dispatcher still reads the response metadata from it afterwards.
#[derive(Clone, Default)]
pub struct Context {
    extensions: Arc<RwLock<Extensions>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an arbitrary value in this call's scope, replacing any value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&self, value: T) {
        self.write().insert(value);
    }

    /// Get a copy of a value stored in this call's scope.
    pub fn get<T: Clone + 'static>(&self) -> Option<T> {
        self.read().get::<T>().cloned()
    }

    pub fn attach_request_metadata(&self, headers: HeaderMap) {
        self.insert(RequestMetadata(headers));
    }

    /// Request headers, if any were attached.  `None` is a normal answer, not a failure.
    pub fn request_metadata(&self) -> Option<HeaderMap> {
        self.get::<RequestMetadata>().map(|RequestMetadata(headers)| headers)
    }

    pub fn attach_response_metadata(&self, headers: HeaderMap) {
        self.insert(ResponseMetadata(headers));
    }

    /// Response headers, if any were attached.  `None` is a normal answer, not a failure.
    pub fn response_metadata(&self) -> Option<HeaderMap> {
        self.get::<ResponseMetadata>().map(|ResponseMetadata(headers)| headers)
    }

    /// Add one header to the response metadata, creating it if nothing was attached yet.
    pub fn set_response_header(&self, name: HeaderName, value: HeaderValue) {
        let mut extensions = self.write();
        let ResponseMetadata(headers) = extensions.get_or_insert_with(ResponseMetadata::default);
        headers.insert(name, value);
    }

    /// Add one header to the request metadata, creating it if nothing was attached yet.
    pub fn set_request_header(&self, name: HeaderName, value: HeaderValue) {
        let mut extensions = self.write();
        let RequestMetadata(headers) = extensions.get_or_insert_with(RequestMetadata::default);
        headers.insert(name, value);
    }

    /// The route of the request being served.  Only set on the server side.
    pub fn route(&self) -> Option<RouteComponents> {
        self.get::<RouteComponents>()
    }

    /// The content type negotiated for this call.
    pub fn content_type(&self) -> Option<ContentType> {
        self.get::<ContentType>()
    }

    // A poisoned lock only means some other holder panicked mid-update; the map itself is still
    // usable, and the dispatcher reports the panic separately.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Extensions> {
        self.extensions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Extensions> {
        self.extensions.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("request_metadata", &self.request_metadata())
            .field("response_metadata", &self.response_metadata())
            .field("route", &self.route())
            .field("content_type", &self.content_type())
            .finish()
    }
}
