//! A haberdasher service served over HTTP, and a client that calls it with both encodings.
//!
//! Run with `cargo run -p twirpox --example haberdasher`; set `RUST_LOG=debug` to see the requests
//! going by.
use serde::{Deserialize, Serialize};
use tracing::info;
use twirpox::client::{ReqwestTransport, ReqwestTransportConfig};
use twirpox::{ClientConfig, Context, Result, TwirpError};

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Size {
    #[prost(int32, tag = "1")]
    pub inches: i32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Hat {
    #[prost(int32, tag = "1")]
    pub inches: i32,
    #[prost(string, tag = "2")]
    pub color: String,
    #[prost(string, tag = "3")]
    pub name: String,
}

twirpox::service! {
    package example.haberdasher;

    /// Makes hats for clients.
    service Haberdasher {
        /// Makes a hat of the requested size.
        rpc MakeHat(Size) returns (Hat);
    }
}

struct Shop;

#[twirpox::async_trait]
impl Haberdasher for Shop {
    async fn make_hat(&self, _ctx: Context, size: Size) -> Result<Hat> {
        if size.inches <= 0 {
            return Err(TwirpError::invalid_argument("inches", "I can't make a hat that small!"));
        }

        let color = ["white", "black", "brown", "red", "blue"][size.inches as usize % 5];
        Ok(Hat {
            inches: size.inches,
            color: color.to_string(),
            name: "bowler".to_string(),
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    info!(%addr, "Serving {HABERDASHER_SERVICE_ID}");

    let router = twirpox::server::into_router(haberdasher_server(Shop));
    tokio::spawn(async move { axum::serve(listener, router).await });

    let transport = ReqwestTransport::with_config(&ReqwestTransportConfig::default())?;
    let config = ClientConfig {
        base_url: Some(format!("http://{addr}").parse()?),
        prefix: None,
    };

    let json = HaberdasherJsonClient::with_config(transport.clone(), config.clone());
    let hat = json.make_hat(&Size { inches: 12 }).await?;
    println!("JSON client got a {} {} of {} inches", hat.color, hat.name, hat.inches);

    let protobuf = HaberdasherProtobufClient::with_config(transport, config);
    let hat = protobuf.make_hat(&Size { inches: 7 }).await?;
    println!("Protobuf client got a {} {} of {} inches", hat.color, hat.name, hat.inches);

    match protobuf.make_hat(&Size { inches: -1 }).await {
        Ok(hat) => println!("Unexpectedly got a hat: {hat:?}"),
        Err(e) => println!("Server refused ({}): {}", e.code().as_str(), e.msg()),
    }

    Ok(())
}
