//! Very simple example in which the server has a method `Echo`, which returns whatever message the
//! client sent.  The client talks to the server in-process, without any networking.
use serde::{Deserialize, Serialize};
use twirpox_proto::{ClientBuilder, Context, Server, TwirpError};

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
struct Echo {
    #[prost(string, tag = "1")]
    text: String,
}

#[tokio::main]
async fn main() {
    let server = Server::builder("example.echo.Echoer")
        .without_state()
        .with_method("Echo", |_: (), _: Context, request: Echo| async move {
            if request.text.is_empty() {
                return Err(TwirpError::invalid_argument("text", "must not be empty"));
            }

            Ok(request)
        })
        .build();

    println!("Serving at {}", server.method_path("Echo"));

    let client = ClientBuilder::new("example.echo.Echoer").bind(server);

    let request = Echo {
        text: "Hello, world!".to_string(),
    };
    let response: Echo = client.call_json("Echo", &request).await.unwrap();
    assert_eq!(response, request);

    let response: Echo = client.call_protobuf("Echo", &request).await.unwrap();
    assert_eq!(response, request);

    let error = client
        .call_json::<_, Echo>("Echo", &Echo::default())
        .await
        .unwrap_err();
    println!("Empty text is rejected: {error}");
}
