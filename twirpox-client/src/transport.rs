//! Client-side transports for speaking the protocol to remote servers.
//!
//! All of these provide an implementation of [`twirpox_proto::HttpTransport`], to connect the
//! transport-agnostic client to an actual network.

mod network;

pub use network::*;
