//! axum binding for `twirpox` servers.
//!
//! A [`Server`] from `twirpox-proto` dispatches fully-read requests but doesn't listen on any
//! socket.  This crate wraps one in an [`axum::Router`], which can then be served with
//! [`axum::serve`] or nested into a larger application.
//!
//! The router catches every path and every verb, so that requests with the wrong verb or path still
//! reach the dispatcher and get the protocol's `bad_route` error rather than axum's own 404 or 405.
use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::Response;
use bytes::Bytes;
use twirpox_proto::{Server, TwirpError, error_response};

/// Default maximum request body size (16 MiB).
///
/// Requests with larger bodies are rejected as `malformed` without being dispatched.
pub const DEFAULT_MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Create a router serving `server`, with the default body size limit.
pub fn into_router<S: Clone + Send + Sync + 'static>(server: Server<S>) -> axum::Router {
    into_router_with_limit(server, DEFAULT_MAX_BODY_SIZE)
}

/// Create a router serving `server`, rejecting request bodies larger than `max_body_size` bytes.
pub fn into_router_with_limit<S: Clone + Send + Sync + 'static>(
    server: Server<S>,
    max_body_size: usize,
) -> axum::Router {
    tracing::debug!(
        service_id = server.service_id(),
        prefix = server.path_prefix(),
        max_body_size,
        "Binding server to axum router"
    );

    axum::Router::new()
        .fallback(handle::<S>)
        .with_state(BindingState { server, max_body_size })
}

#[derive(Clone)]
struct BindingState<S: Clone + Send + Sync + 'static> {
    server: Server<S>,
    max_body_size: usize,
}

async fn handle<S: Clone + Send + Sync + 'static>(
    State(state): State<BindingState<S>>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();

    let body: Bytes = match axum::body::to_bytes(body, state.max_body_size).await {
        Ok(body) => body,
        Err(e) => {
            tracing::debug!(error = %e, path = %parts.uri.path(), "Failed to read request body");
            let error = TwirpError::malformed(format!("the request body could not be read: {e}"));
            return error_response(&error).map(Body::from);
        }
    };

    state
        .server
        .handle(http::Request::from_parts(parts, body))
        .await
        .map(Body::from)
}
