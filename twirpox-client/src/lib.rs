//! Network client transport for `twirpox`.
//!
//! The protocol client in `twirpox-proto` knows how to build requests and interpret responses, but
//! leaves sending them to an [`HttpTransport`](twirpox_proto::HttpTransport).  This crate provides
//! the one that goes over the network, backed by `reqwest`, along with [`connect`] to put the two
//! together.
mod error;
mod transport;

pub use error::{ClientError, Result};
pub use transport::*;

use twirpox_proto::{Client, ClientBuilder, ClientConfig};

/// Build a protocol client for `service_id` that talks to the server at `config.base_url` over
/// HTTP.
///
/// The base URL is required, since the network transport can only send requests with absolute
/// URIs.
pub fn connect(
    service_id: impl Into<String>,
    config: ClientConfig,
    transport_config: &ReqwestTransportConfig,
) -> Result<Client<ReqwestTransport>> {
    let transport = ReqwestTransport::with_config(transport_config)?;

    Ok(ClientBuilder::new(service_id).with_config(config).bind(transport))
}
