use std::sync::Arc;

use futures::lock::Mutex;
use serde::{Deserialize, Serialize};
use twirpox_proto::http::{HeaderName, HeaderValue};
use twirpox_proto::{Context, Result, Router, Server, TwirpError};

pub use crate::test_helpers::{Hat, MethodRequest, MethodResponse, Size};

pub const SERVICE_ID: &str = "example.haberdasher.Haberdasher";

/// A hat-making service built on the protocol crate, used to exercise servers and clients end to
/// end.
#[derive(Debug, Default)]
pub struct TestState {
    hats_made: i32,
}

pub type SharedState = Arc<Mutex<TestState>>;

/// Summary of the service's activity so far.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    #[prost(int32, tag = "1")]
    pub hats_made: i32,
}

pub fn test_service_router() -> Router<SharedState> {
    let mut router = Router::new_with_state(Arc::new(Mutex::new(TestState::default())));

    router.register_method("MakeHat", make_hat);
    router.register_method("GetStats", get_stats);
    router.register_method("EchoRequestId", echo_request_id);
    router.register_method("FailWithError", fail_with_error);
    router.register_method("FailWithAnyhow", fail_with_anyhow);
    router.register_method("FailWithPanic", fail_with_panic);

    router
}

pub fn test_service_server() -> Server<SharedState> {
    Server::builder(SERVICE_ID)
        .with_router(test_service_router())
        .build()
}

/// The single-method service `pkg.Svc`, whose `Method` answers `{x}` with `{y: x + 1}`.
pub fn scenario_server() -> Server {
    Server::builder("pkg.Svc")
        .without_state()
        .with_method(
            "Method",
            |_: (), _: Context, request: MethodRequest| async move {
                Ok::<_, TwirpError>(MethodResponse { y: request.x + 1 })
            },
        )
        .build()
}

async fn make_hat(state: SharedState, _ctx: Context, size: Size) -> Result<Hat> {
    if size.inches <= 0 {
        return Err(TwirpError::invalid_argument("inches", "I can't make a hat that small!"));
    }

    let mut state = state.lock().await;
    state.hats_made += 1;

    Ok(Hat {
        inches: size.inches,
        color: ["white", "black", "brown", "red", "blue"][(state.hats_made % 5) as usize].to_string(),
        name: ["bowler", "baseball cap", "top hat", "derby"][(state.hats_made % 4) as usize].to_string(),
    })
}

async fn get_stats(state: SharedState, _ctx: Context, _size: Size) -> Result<Stats> {
    let state = state.lock().await;

    Ok(Stats {
        hats_made: state.hats_made,
    })
}

/// Copies the `x-request-id` request header to the response, and reports whether it was there.
async fn echo_request_id(_state: SharedState, ctx: Context, _size: Size) -> Result<Stats> {
    let request_id = ctx
        .request_metadata()
        .and_then(|headers| headers.get("x-request-id").cloned());

    match request_id {
        Some(request_id) => {
            ctx.set_response_header(HeaderName::from_static("x-request-id"), request_id);
            Ok(Stats { hats_made: 1 })
        }
        None => {
            ctx.set_response_header(HeaderName::from_static("x-request-id"), HeaderValue::from_static("none"));
            Ok(Stats { hats_made: 0 })
        }
    }
}

async fn fail_with_error(_state: SharedState, _ctx: Context, _size: Size) -> Result<Hat> {
    Err(TwirpError::not_found("out of felt").with_meta("material", "felt"))
}

async fn fail_with_anyhow(_state: SharedState, _ctx: Context, _size: Size) -> anyhow::Result<Hat> {
    let err = std::io::Error::other("loom jammed");
    Err(anyhow::Error::new(err).context("failed to weave brim"))
}

async fn fail_with_panic(_state: SharedState, _ctx: Context, size: Size) -> Result<Hat> {
    if size.inches >= 0 {
        panic!("the hat machine caught fire");
    }

    Ok(Hat::default())
}
