//! Exercise code generated by `service!`, in-process and over HTTP.

#[path = "../../twirpox-proto/src/testing.rs"]
mod test_helpers;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};

use serde::{Deserialize, Serialize};
use test_helpers::{Hat, Size, init_test_logging};
use twirpox::client::ReqwestTransportConfig;
use twirpox::http::{HeaderName, HeaderValue};
use twirpox::{ClientConfig, Context, ErrorCode, Result, ServerConfig, TwirpError};

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Empty {}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct HatCount {
    #[prost(int32, tag = "1")]
    pub count: i32,
}

twirpox::service! {
    package example.haberdasher;

    /// A service that makes hats for clients.
    service Haberdasher {
        /// Makes a hat of the given size.
        rpc MakeHat(Size) returns (Hat);
        rpc CountHats(Empty) returns (HatCount);
        rpc WhoAmI(Empty) returns (Hat);
    }

    service Milliner {
        rpc MakeHat(Size) returns (Hat);
    }
}

#[derive(Default)]
struct HatShop {
    hats_made: AtomicI32,
}

#[twirpox::async_trait]
impl Haberdasher for HatShop {
    async fn make_hat(&self, _ctx: Context, size: Size) -> Result<Hat> {
        if size.inches <= 0 {
            return Err(TwirpError::invalid_argument("inches", "I can't make a hat that small!"));
        }
        self.hats_made.fetch_add(1, Ordering::SeqCst);

        Ok(Hat {
            inches: size.inches,
            color: "grey".to_string(),
            name: "fedora".to_string(),
        })
    }

    async fn count_hats(&self, _ctx: Context, _request: Empty) -> Result<HatCount> {
        Ok(HatCount {
            count: self.hats_made.load(Ordering::SeqCst),
        })
    }

    /// Reports the caller's `authorization` header back as the hat's name.
    async fn who_am_i(&self, ctx: Context, _request: Empty) -> Result<Hat> {
        let caller = ctx
            .request_metadata()
            .and_then(|headers| headers.get("authorization").cloned())
            .ok_or_else(|| TwirpError::unauthenticated("who are you?"))?;
        ctx.set_response_header(HeaderName::from_static("x-hat-shop"), HeaderValue::from_static("open"));

        Ok(Hat {
            name: String::from_utf8_lossy(caller.as_bytes()).into_owned(),
            ..Default::default()
        })
    }
}

struct NoHats;

#[twirpox::async_trait]
impl Milliner for NoHats {
    async fn make_hat(&self, _ctx: Context, _size: Size) -> Result<Hat> {
        Err(TwirpError::unimplemented("out of felt"))
    }
}

#[test]
fn generated_constants() {
    assert_eq!(HABERDASHER_SERVICE_ID, "example.haberdasher.Haberdasher");
    assert_eq!(HABERDASHER_METHODS, &["MakeHat", "CountHats", "WhoAmI"]);
    assert_eq!(MILLINER_SERVICE_ID, "example.haberdasher.Milliner");

    let router = haberdasher_router(HatShop::default());
    let mut names = router.method_names().collect::<Vec<_>>();
    names.sort_unstable();
    assert_eq!(names, ["CountHats", "MakeHat", "WhoAmI"]);

    let server = haberdasher_server(HatShop::default());
    assert_eq!(server.service_id(), HABERDASHER_SERVICE_ID);
    assert_eq!(
        server.method_path("MakeHat"),
        "/twirp/example.haberdasher.Haberdasher/MakeHat"
    );
}

#[tokio::test]
async fn typed_clients_in_process() {
    init_test_logging();
    let server = haberdasher_server(HatShop::default());

    let json = HaberdasherJsonClient::new(server.clone());
    let protobuf = HaberdasherProtobufClient::new(server);

    let hat = json.make_hat(&Size { inches: 10 }).await.unwrap();
    assert_eq!(hat.inches, 10);
    assert_eq!(hat.name, "fedora");

    let hat = protobuf.make_hat(&Size { inches: 11 }).await.unwrap();
    assert_eq!(hat.inches, 11);

    let count = protobuf.count_hats(&Empty {}).await.unwrap();
    assert_eq!(count.count, 2);

    let error = json.make_hat(&Size { inches: 0 }).await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::InvalidArgument);
    assert_eq!(error.meta("argument"), Some("inches"));
}

#[tokio::test]
async fn metadata_through_generated_clients() {
    let client = HaberdasherJsonClient::new(haberdasher_server(HatShop::default()));

    let error = client.who_am_i(&Empty {}).await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::Unauthenticated);

    let ctx = Context::new();
    ctx.set_request_header(
        HeaderName::from_static("authorization"),
        HeaderValue::from_static("Bearer mad-hatter"),
    );
    let hat = client.who_am_i_with_context(&ctx, &Empty {}).await.unwrap();
    assert_eq!(hat.name, "Bearer mad-hatter");
    assert_eq!(ctx.response_metadata().unwrap()["x-hat-shop"], "open");
}

#[tokio::test]
async fn services_are_separate() {
    let client = MillinerJsonClient::new(milliner_server(NoHats));
    let error = client.make_hat(&Size { inches: 1 }).await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::Unimplemented);

    // A Milliner client pointed at a Haberdasher server finds no such service
    let client = MillinerJsonClient::new(haberdasher_server(HatShop::default()));
    let error = client.make_hat(&Size { inches: 1 }).await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::BadRoute);
}

#[tokio::test]
async fn custom_prefix_on_both_sides() {
    let server = haberdasher_server_with_config(
        HatShop::default(),
        ServerConfig {
            prefix: Some("hats".to_string()),
        },
    );
    let client = HaberdasherProtobufClient::with_config(
        server,
        ClientConfig {
            prefix: Some("hats".to_string()),
            ..Default::default()
        },
    );

    let hat = client.make_hat(&Size { inches: 4 }).await.unwrap();
    assert_eq!(hat.inches, 4);
}

async fn spawn(router: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    addr
}

#[tokio::test]
async fn typed_clients_over_http() {
    init_test_logging();
    let addr = spawn(twirpox::server::into_router(haberdasher_server(HatShop::default()))).await;

    let transport = twirpox::client::ReqwestTransport::with_config(&ReqwestTransportConfig::default()).unwrap();
    let config = ClientConfig {
        base_url: Some(format!("http://{addr}").parse().unwrap()),
        prefix: None,
    };
    let json = HaberdasherJsonClient::with_config(transport.clone(), config.clone());
    let protobuf = HaberdasherProtobufClient::with_config(transport, config);

    let hat = json.make_hat(&Size { inches: 8 }).await.unwrap();
    assert_eq!(hat.inches, 8);
    let hat = protobuf.make_hat(&Size { inches: 9 }).await.unwrap();
    assert_eq!(hat.inches, 9);
    assert_eq!(json.count_hats(&Empty {}).await.unwrap().count, 2);

    let error = protobuf.make_hat(&Size { inches: -3 }).await.unwrap_err();
    assert_eq!(error.code(), ErrorCode::InvalidArgument);
}
