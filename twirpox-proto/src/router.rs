//! Once a request has been routed to a service and its content type is known, the method name
//! picks a handler.  The table of handlers for one service is the [`Router`].
//!
//! Handlers are ordinary async functions or closures taking the router state, the call's
//! [`Context`] and the decoded request message.  The router erases their types so that methods with
//! different request and response types can live in the same table, and wraps each one so that it
//! decodes its own request and encodes its own response.
use std::collections::HashMap;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;

use crate::{CAUSE_META_KEY, ContentType, Context, IntoTwirpError, Message, Result, TwirpError, codec};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// A handler for one method of a service.
///
/// This is implemented for every function or closure with the signature
/// `async fn(S, Context, Req) -> Result<Resp, E>` where `E` implements [`IntoTwirpError`], so it's
/// not expected that users implement it directly.
///
/// - `S` is the router state, cloned for every call.  Stateless routers use `()`.
/// - The [`Context`] carries the request's headers and lets the handler attach response headers.
pub trait Handler<Req, Resp, S>: Clone + Send + Sync + Sized + 'static {
    type Error: IntoTwirpError;
    type Future: Future<Output = Result<Resp, Self::Error>> + Send + 'static;

    fn call(self, state: S, ctx: Context, request: Req) -> Self::Future;
}

impl<F, Fut, S, Req, Resp, E> Handler<Req, Resp, S> for F
where
    F: FnOnce(S, Context, Req) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, E>> + Send + 'static,
    E: IntoTwirpError,
{
    type Error = E;
    type Future = Fut;

    fn call(self, state: S, ctx: Context, request: Req) -> Self::Future {
        self(state, ctx, request)
    }
}

/// Dyn-compatible form of a registered method, with the message types erased.  Takes the raw
/// request body and produces the raw response body.
pub(crate) trait ErasedMethod<S>: Send + Sync + 'static {
    fn call(&self, state: S, ctx: Context, content_type: ContentType, body: Bytes) -> BoxFuture<Result<Bytes>>;
}

struct MethodHandler<H, Req, Resp> {
    handler: H,
    _phantom: PhantomData<fn(Req) -> Resp>,
}

impl<H, S, Req, Resp> ErasedMethod<S> for MethodHandler<H, Req, Resp>
where
    H: Handler<Req, Resp, S>,
    S: Send + 'static,
    Req: Message,
    Resp: Message,
{
    fn call(&self, state: S, ctx: Context, content_type: ContentType, body: Bytes) -> BoxFuture<Result<Bytes>> {
        let handler = self.handler.clone();

        async move {
            let request: Req = codec::decode_message(content_type, &body).map_err(|e| {
                TwirpError::malformed(format!(
                    "the {} request could not be decoded: {e}",
                    content_type.label()
                ))
            })?;

            let response = invoke(handler, state, ctx, request).await?;

            codec::encode_message(content_type, &response).map_err(|e| {
                tracing::error!(error = %e, content_type = %content_type, "Failed to serialize response");
                TwirpError::wrap_internal(&e, &format!("failed to serialize {} response", content_type.label()))
            })
        }
        .boxed()
    }
}

/// Run the handler exactly once, turning whatever it fails with (including a panic) into a
/// protocol error.
async fn invoke<H, S, Req, Resp>(handler: H, state: S, ctx: Context, request: Req) -> Result<Resp>
where
    H: Handler<Req, Resp, S>,
{
    // The call itself happens inside the async block, so a panic before the handler's future is
    // even created is caught as well
    let outcome = AssertUnwindSafe(async move { handler.call(state, ctx, request).await })
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) => Err(e.into_twirp_error()),
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "<non-string panic payload>".to_string());
            tracing::error!(panic = %message, "Handler panicked");

            Err(TwirpError::internal("internal service panic").with_meta(CAUSE_META_KEY, "panic"))
        }
    }
}

/// The methods of one service, and the state their handlers share.
#[derive(Clone)]
pub struct Router<S: Clone + Send + Sync + 'static = ()> {
    state: S,
    methods: HashMap<String, Arc<dyn ErasedMethod<S>>>,
}

impl Router {
    /// Create a new router that doesn't need any state.
    pub fn new_stateless() -> Router<()> {
        Router {
            state: (),
            methods: HashMap::new(),
        }
    }
}

impl<S: Clone + Send + Sync + 'static> Router<S> {
    /// Create a new router whose handlers get a clone of `state` on every call.
    pub fn new_with_state(state: S) -> Self {
        Router {
            state,
            methods: HashMap::new(),
        }
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Register the handler for a method, replacing any previous handler for the same name.
    ///
    /// `name` is the method name as it appears in the request path, e.g. `MakeHat`.
    pub fn register_method<H, Req, Resp>(&mut self, name: impl Into<String>, handler: H)
    where
        H: Handler<Req, Resp, S>,
        Req: Message,
        Resp: Message,
    {
        let method = MethodHandler {
            handler,
            _phantom: PhantomData,
        };
        self.methods.insert(name.into(), Arc::new(method));
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Names of all registered methods, in no particular order.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Look up the handler for a method.
    pub(crate) fn method(&self, name: &str) -> Option<&Arc<dyn ErasedMethod<S>>> {
        self.methods.get(name)
    }

    /// Decode `body`, run the handler for `method`, and encode its response.
    ///
    /// Returns `None` when no such method is registered, leaving it to the caller to decide what
    /// kind of error that is.
    #[cfg(test)]
    fn call(
        &self,
        method: &str,
        ctx: Context,
        content_type: ContentType,
        body: Bytes,
    ) -> Option<BoxFuture<Result<Bytes>>> {
        let handler = self.method(method)?;

        Some(handler.call(self.state.clone(), ctx, content_type, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;
    use crate::testing::{Hat, Size, init_test_logging};
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn make_hat(_state: (), _ctx: Context, size: Size) -> Result<Hat> {
        if size.inches <= 0 {
            return Err(TwirpError::invalid_argument("inches", "must be positive"));
        }

        Ok(Hat {
            inches: size.inches,
            color: "blue".to_string(),
            name: "bowler".to_string(),
        })
    }

    fn test_router() -> Router {
        let mut router = Router::new_stateless();
        router.register_method("MakeHat", make_hat);
        router
    }

    async fn call_json<S: Clone + Send + Sync + 'static>(
        router: &Router<S>,
        method: &str,
        body: &'static str,
    ) -> Option<Result<Bytes>> {
        let fut = router.call(method, Context::new(), ContentType::Json, Bytes::from_static(body.as_bytes()))?;
        Some(fut.await)
    }

    #[tokio::test]
    async fn dispatches_to_registered_method() {
        init_test_logging();
        let router = test_router();

        let body = call_json(&router, "MakeHat", r#"{"inches": 10}"#).await.unwrap().unwrap();
        let hat: Hat = serde_json::from_slice(&body).unwrap();
        assert_eq!(hat.inches, 10);
        assert_eq!(hat.name, "bowler");
    }

    #[tokio::test]
    async fn unknown_method_is_none() {
        let router = test_router();
        assert!(call_json(&router, "MakeShoe", "{}").await.is_none());
        assert!(router.has_method("MakeHat"));
        assert_eq!(router.method_names().collect::<Vec<_>>(), vec!["MakeHat"]);
    }

    #[tokio::test]
    async fn undecodable_request_is_malformed() {
        let router = test_router();

        let err = call_json(&router, "MakeHat", r#"{"inches":"#).await.unwrap().unwrap_err();
        assert_eq!(err.code(), ErrorCode::Malformed);
        assert!(
            err.msg().starts_with("the json request could not be decoded: "),
            "{}",
            err.msg()
        );

        let err = router
            .call("MakeHat", Context::new(), ContentType::Protobuf, Bytes::from_static(&[0xff]))
            .unwrap()
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Malformed);
        assert!(err.msg().starts_with("the protobuf request could not be decoded: "));
    }

    #[tokio::test]
    async fn protocol_errors_pass_through() {
        let router = test_router();
        let err = call_json(&router, "MakeHat", r#"{"inches": -1}"#).await.unwrap().unwrap_err();
        assert_eq!(err, TwirpError::invalid_argument("inches", "must be positive"));
    }

    #[tokio::test]
    async fn other_errors_become_internal() {
        init_test_logging();
        let mut router = Router::new_stateless();
        router.register_method("Fail", |_: (), _: Context, _: Size| async move {
            Err::<Hat, _>(anyhow::anyhow!("database unreachable"))
        });

        let err = call_json(&router, "Fail", "{}").await.unwrap().unwrap_err();
        assert_eq!(err.code(), ErrorCode::Internal);
        assert_eq!(err.msg(), "database unreachable");
        assert_eq!(err.meta(CAUSE_META_KEY), Some("anyhow::Error"));
    }

    #[tokio::test]
    async fn panics_become_internal() {
        init_test_logging();
        let mut router = Router::new_stateless();
        router.register_method("Panic", |_: (), _: Context, _: Size| async move {
            if true {
                panic!("handler blew up");
            }
            Ok::<Hat, TwirpError>(Hat::default())
        });

        let err = call_json(&router, "Panic", "{}").await.unwrap().unwrap_err();
        assert_eq!(err.code(), ErrorCode::Internal);
        assert_eq!(err.meta(CAUSE_META_KEY), Some("panic"));
    }

    #[tokio::test]
    async fn state_is_shared_and_handler_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut router = Router::new_with_state(calls.clone());
        router.register_method(
            "Count",
            |calls: Arc<AtomicUsize>, _: Context, size: Size| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TwirpError>(size)
            },
        );

        let body = router
            .call("Count", Context::new(), ContentType::Protobuf, Bytes::new())
            .unwrap()
            .await
            .unwrap();
        assert!(body.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let _ = call_json(&router, "Count", "not json").await;
        // Decoding failed, so the handler never ran
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn response_metadata_set_by_handler_is_visible() {
        let mut router = Router::new_stateless();
        router.register_method("Tag", |_: (), ctx: Context, size: Size| async move {
            ctx.set_response_header(
                http::HeaderName::from_static("x-tag"),
                http::HeaderValue::from_static("yes"),
            );
            Ok::<_, TwirpError>(size)
        });

        let ctx = Context::new();
        let result = router
            .call("Tag", ctx.clone(), ContentType::Json, Bytes::from_static(b"{}"))
            .unwrap()
            .await;
        assert_matches!(result, Ok(_));
        assert_eq!(ctx.response_metadata().unwrap().get("x-tag").unwrap(), "yes");
    }
}
