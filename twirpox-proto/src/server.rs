//! Server-side dispatch of a single service.
//!
//! A [`Server`] takes a fully-read HTTP request and produces the HTTP response, without doing any
//! networking itself.  Bind it to an HTTP server with `twirpox-server`, or call it in-process
//! through the [`HttpTransport`](crate::HttpTransport) implementation.
use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use crate::{
    ContentType, Context, ErrorCode, Handler, Message, Result, RouteComponents, Router, TwirpError, route,
};

/// Server settings that are usually read from a config file rather than set in code.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Path prefix that precedes `<package>.<Service>/<Method>`.
    ///
    /// Unset means the default prefix `twirp`.  An empty string means no prefix at all, so methods
    /// are served at `/<package>.<Service>/<Method>`.
    pub prefix: Option<String>,
}

/// Observer of the server's dispatch of each request.
///
/// All methods have empty default implementations; implement only the ones of interest.  Hooks are
/// called synchronously on the request's task and cannot change the outcome of the request.
pub trait ServerHooks: Send + Sync + 'static {
    /// The request matched a method and its content type was accepted.  The context carries the
    /// route, content type and request headers from here on.
    fn request_routed(&self, _ctx: &Context) {}

    /// The response is about to be returned to the transport.
    fn response_prepared(&self, _ctx: &Context, _status: StatusCode) {}

    /// The request failed, either before reaching the handler or in it.
    fn error(&self, _ctx: &Context, _error: &TwirpError) {}
}

pub struct ServerBuilder<Stage> {
    service_id: String,
    config: ServerConfig,
    hooks: Option<Arc<dyn ServerHooks>>,
    stage: Stage,
}

impl<Stage> ServerBuilder<Stage> {
    /// Replace the whole configuration.
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Serve under a different path prefix.  An empty prefix serves methods directly under `/`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = Some(prefix.into());
        self
    }

    pub fn with_hooks(mut self, hooks: impl ServerHooks) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    fn into_stage2<S: Clone + Send + Sync + 'static>(self, router: Router<S>) -> ServerBuilder<Stage2<S>> {
        ServerBuilder {
            service_id: self.service_id,
            config: self.config,
            hooks: self.hooks,
            stage: Stage2 { router },
        }
    }
}

impl ServerBuilder<Stage1> {
    pub fn with_state<S: Clone + Send + Sync + 'static>(self, state: S) -> ServerBuilder<Stage2<S>> {
        self.into_stage2(Router::new_with_state(state))
    }

    pub fn without_state(self) -> ServerBuilder<Stage2<()>> {
        self.into_stage2(Router::new_stateless())
    }

    pub fn with_router<S: Clone + Send + Sync + 'static>(self, router: Router<S>) -> ServerBuilder<Stage2<S>> {
        self.into_stage2(router)
    }
}

impl<S: Clone + Send + Sync + 'static> ServerBuilder<Stage2<S>> {
    pub fn with_method<H, Req, Resp>(mut self, name: impl Into<String>, handler: H) -> Self
    where
        H: Handler<Req, Resp, S>,
        Req: Message,
        Resp: Message,
    {
        self.stage.router.register_method(name, handler);
        self
    }

    pub fn build(self) -> Server<S> {
        let prefix = route::normalize_prefix(self.config.prefix.as_deref());

        tracing::debug!(
            service_id = %self.service_id,
            prefix = %prefix,
            methods = self.stage.router.method_names().count(),
            "Built server"
        );

        Server {
            inner: Arc::new(ServerInner {
                service_id: self.service_id,
                prefix,
                router: self.stage.router,
                hooks: self.hooks,
            }),
        }
    }
}

#[doc(hidden)]
pub struct Stage1;

#[doc(hidden)]
pub struct Stage2<S: Clone + Send + Sync + 'static> {
    router: Router<S>,
}

/// Dispatcher for all methods of one service.
///
/// Cheap to clone; clones share the same method table, which can't change after
/// [`ServerBuilder::build`].
pub struct Server<S: Clone + Send + Sync + 'static = ()> {
    inner: Arc<ServerInner<S>>,
}

struct ServerInner<S: Clone + Send + Sync + 'static> {
    service_id: String,
    prefix: String,
    router: Router<S>,
    hooks: Option<Arc<dyn ServerHooks>>,
}

impl<S: Clone + Send + Sync + 'static> Clone for Server<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Server {
    /// Start building a server for the service `service_id`, `<package>.<Service>`.
    pub fn builder(service_id: impl Into<String>) -> ServerBuilder<Stage1> {
        ServerBuilder {
            service_id: service_id.into(),
            config: ServerConfig::default(),
            hooks: None,
            stage: Stage1,
        }
    }
}

impl<S: Clone + Send + Sync + 'static> Server<S> {
    pub fn service_id(&self) -> &str {
        &self.inner.service_id
    }

    /// The normalized prefix, without surrounding slashes.  Empty if methods are served at the root.
    pub fn path_prefix(&self) -> &str {
        &self.inner.prefix
    }

    /// The path at which `method` is served.
    pub fn method_path(&self, method: &str) -> String {
        route::build_path(&self.inner.prefix, &self.inner.service_id, method)
    }

    pub fn router(&self) -> &Router<S> {
        &self.inner.router
    }

    /// Dispatch one request.
    ///
    /// This never fails: every problem, from a wrong path to a panicking handler, is rendered as
    /// an error response.
    pub async fn handle(&self, request: http::Request<Bytes>) -> http::Response<Bytes> {
        let span = tracing::debug_span!(
            "twirp_request",
            method = %request.method(),
            path = %request.uri().path(),
        );

        self.handle_request(request).instrument(span).await
    }

    async fn handle_request(&self, request: http::Request<Bytes>) -> http::Response<Bytes> {
        let ctx = Context::new();
        let (parts, body) = request.into_parts();

        let response = match self.dispatch(&ctx, &parts, body).await {
            Ok((content_type, body)) => {
                tracing::debug!(content_type = %content_type, len = body.len(), "Request succeeded");
                let mut response = http::Response::new(body);
                set_body_headers(response.headers_mut(), content_type);
                response
            }
            Err(error) => {
                if error.code() == ErrorCode::Internal {
                    tracing::error!(%error, "Request failed with internal error");
                } else {
                    tracing::debug!(%error, "Request failed");
                }
                if let Some(hooks) = &self.inner.hooks {
                    hooks.error(&ctx, &error);
                }

                error_response(&error)
            }
        };

        let response = merge_response_metadata(&ctx, response);
        if let Some(hooks) = &self.inner.hooks {
            hooks.response_prepared(&ctx, response.status());
        }

        response
    }

    /// Everything between receiving the request and having the encoded response body.
    async fn dispatch(
        &self,
        ctx: &Context,
        parts: &http::request::Parts,
        body: Bytes,
    ) -> Result<(ContentType, Bytes)> {
        let path = parts.uri.path();
        let route = RouteComponents::parse(path);

        route::validate_route(&parts.method, path, &route, &self.inner.prefix, &self.inner.service_id)?;

        let handler = self.inner.router.method(&route.method).ok_or_else(|| {
            TwirpError::bad_route(format!("no handler for path {path}"), &parts.method, path)
        })?;

        let content_type = ContentType::negotiate(&parts.headers, &parts.method, path)?;

        ctx.attach_request_metadata(parts.headers.clone());
        ctx.insert(route.clone());
        ctx.insert(content_type);
        if let Some(hooks) = &self.inner.hooks {
            hooks.request_routed(ctx);
        }

        let call = handler.call(self.inner.router.state().clone(), ctx.clone(), content_type, body);
        let body = call.await?;

        Ok((content_type, body))
    }
}

/// Render an error as the response a peer expects: the mapped status, the JSON error body, and
/// `Content-Type: application/json`.
pub fn error_response(error: &TwirpError) -> http::Response<Bytes> {
    let status = StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut response = http::Response::new(error.to_json_body());
    *response.status_mut() = status;
    set_body_headers(response.headers_mut(), ContentType::Json);

    response
}

fn set_body_headers(headers: &mut HeaderMap, content_type: ContentType) {
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
}

/// Add whatever headers the handler attached, then set the encoder's `Content-Type` and
/// `Content-Length` over them.
fn merge_response_metadata(ctx: &Context, response: http::Response<Bytes>) -> http::Response<Bytes> {
    let (mut parts, body) = response.into_parts();

    if let Some(metadata) = ctx.response_metadata() {
        for (name, value) in &metadata {
            if name != CONTENT_TYPE && name != CONTENT_LENGTH {
                parts.headers.append(name.clone(), value.clone());
            }
        }
    }
    parts.headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));

    http::Response::from_parts(parts, body)
}
