//! Client-side dispatch: turn a typed call into an HTTP request, and the HTTP response back into
//! either the typed response or a [`TwirpError`].
//!
//! Most of the work is in interpreting failures.  A non-200 response might be a well-formed error
//! from a peer speaking the protocol, or it might come from some proxy or load balancer in between
//! that has never heard of it.  Both come out as a [`TwirpError`], the latter tagged with
//! `http_error_from_intermediary` so callers can tell them apart.
use std::sync::Arc;

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    BODY_META_KEY, CAUSE_META_KEY, ContentType, Context, ErrorCode, HttpTransport, INTERMEDIARY_META_KEY,
    LOCATION_META_KEY, Message, Result, STATUS_CODE_META_KEY, TwirpError, codec, route,
};

/// Client settings that are usually read from a config file rather than set in code.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Scheme, host and port of the server.  Only the path of this URL is replaced when making
    /// requests.
    ///
    /// Without a base URL, requests carry only the path, which is enough for transports that
    /// don't need a host (like an in-process [`Server`](crate::Server)).
    pub base_url: Option<Url>,

    /// Path prefix that precedes `<package>.<Service>/<Method>`; unset means `twirp`, empty means
    /// no prefix.  Must match the server's.
    pub prefix: Option<String>,
}

pub struct ClientBuilder {
    service_id: String,
    config: ClientConfig,
}

impl ClientBuilder {
    /// Start building a client for the service `service_id`, `<package>.<Service>`.
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            config: ClientConfig::default(),
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.config.base_url = Some(base_url);
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.prefix = Some(prefix.into());
        self
    }

    /// Finish the client, sending all requests through `transport`.
    pub fn bind<T: HttpTransport>(self, transport: T) -> Client<T> {
        let prefix = route::normalize_prefix(self.config.prefix.as_deref());

        Client {
            inner: Arc::new(ClientInner {
                service_id: self.service_id,
                base_url: self.config.base_url,
                prefix,
                transport,
            }),
        }
    }
}

/// Client for all methods of one service.
///
/// Cheap to clone; clones share the same transport.
pub struct Client<T: HttpTransport> {
    inner: Arc<ClientInner<T>>,
}

struct ClientInner<T> {
    service_id: String,
    base_url: Option<Url>,
    prefix: String,
    transport: T,
}

impl<T: HttpTransport> Clone for Client<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: HttpTransport> Client<T> {
    pub fn service_id(&self) -> &str {
        &self.inner.service_id
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.inner.base_url.as_ref()
    }

    /// The normalized prefix, without surrounding slashes.
    pub fn path_prefix(&self) -> &str {
        &self.inner.prefix
    }

    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// The URL a call to `method` is sent to.
    ///
    /// With a base URL, that URL with its path replaced and its query and fragment dropped;
    /// otherwise just the path.
    pub fn method_url(&self, method: &str) -> String {
        let path = route::build_path(&self.inner.prefix, &self.inner.service_id, method);

        match &self.inner.base_url {
            Some(base_url) => {
                let mut url = base_url.clone();
                url.set_path(&path);
                url.set_query(None);
                url.set_fragment(None);
                url.to_string()
            }
            None => path,
        }
    }

    /// Call `method` with a JSON-encoded request.
    pub async fn call_json<Req: Message, Resp: Message>(&self, method: &str, request: &Req) -> Result<Resp> {
        self.call(&Context::new(), ContentType::Json, method, request).await
    }

    /// Call `method` with a protobuf-encoded request.
    pub async fn call_protobuf<Req: Message, Resp: Message>(&self, method: &str, request: &Req) -> Result<Resp> {
        self.call(&Context::new(), ContentType::Protobuf, method, request).await
    }

    /// Call `method`, encoding the request as `content_type` and expecting the response in the
    /// same content type.
    ///
    /// Any request metadata attached to `ctx` is sent as request headers, except for
    /// `Content-Type` and `Accept` which are always those of `content_type`.  The response
    /// headers are attached to `ctx` as response metadata, whether or not the call succeeds.
    pub async fn call<Req: Message, Resp: Message>(
        &self,
        ctx: &Context,
        content_type: ContentType,
        method: &str,
        request: &Req,
    ) -> Result<Resp> {
        let url = self.method_url(method);
        let body = codec::encode_message(content_type, request).map_err(|e| {
            TwirpError::wrap_internal(&e, &format!("failed to serialize {} request", content_type.label()))
        })?;

        let mut headers = ctx.request_metadata().unwrap_or_default();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
        headers.insert(ACCEPT, HeaderValue::from_static(content_type.as_str()));

        let uri = url
            .parse::<http::Uri>()
            .map_err(|e| TwirpError::wrap_internal(&e, &format!("invalid request URL {url}")))?;
        let mut http_request = http::Request::new(body);
        *http_request.method_mut() = Method::POST;
        *http_request.uri_mut() = uri;
        *http_request.headers_mut() = headers;
        ctx.insert(content_type);

        tracing::trace!(%url, %content_type, "Sending request");
        let response = self.inner.transport.send(http_request).await.map_err(|e| {
            tracing::debug!(%url, error = %e, "Transport failed to send request");
            TwirpError::internal(format!("failed to do request: {e}"))
                .with_meta(CAUSE_META_KEY, std::any::type_name::<T::Error>())
        })?;

        let (parts, body) = response.into_parts();
        ctx.attach_response_metadata(parts.headers.clone());

        if parts.status != StatusCode::OK {
            return Err(error_from_response(parts.status, &parts.headers, &body));
        }

        codec::decode_message(content_type, &body).map_err(|e| {
            TwirpError::internal(format!("failed to decode {} response: {e}", content_type.label()))
        })
    }
}

/// Interpret a non-200 response.
///
/// A redirect is never followed.  Otherwise a protocol error body is returned as-is, and anything
/// else is assumed to come from an intermediary and mapped from the bare status.
pub fn error_from_response(status: StatusCode, headers: &HeaderMap, body: &Bytes) -> TwirpError {
    let code = status.as_u16();
    let reason = status.canonical_reason().unwrap_or_default();

    if status.is_redirection() {
        let location = headers
            .get(LOCATION)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .unwrap_or_default();

        return TwirpError::internal(format!(
            "unexpected HTTP status code {code} \"{reason}\" received, Location=\"{location}\""
        ))
        .with_meta(LOCATION_META_KEY, location)
        .with_meta(INTERMEDIARY_META_KEY, "true")
        .with_meta(STATUS_CODE_META_KEY, code.to_string());
    }

    if let Some(error) = TwirpError::from_json_body(body) {
        return error;
    }

    let text = String::from_utf8_lossy(body);
    tracing::debug!(status = code, body = %text, "Response is not a protocol error; assuming intermediary");

    TwirpError::new(
        ErrorCode::from_intermediary_status(code),
        format!("Error from intermediary with HTTP status code {code} \"{reason}\""),
    )
    .with_meta(INTERMEDIARY_META_KEY, "true")
    .with_meta(STATUS_CODE_META_KEY, code.to_string())
    .with_meta(BODY_META_KEY, text)
}
