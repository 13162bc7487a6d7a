//! The protocol engine behind `twirpox`, a Rust implementation of the
//! [Twirp](https://twitchtv.github.io/twirp/docs/spec_v7.html) RPC protocol.
//!
//! Every method of a service is a single `POST` endpoint, `[/<prefix>]/<package>.<Service>/<Method>`,
//! whose body is the request message in either JSON (`application/json`) or protobuf
//! (`application/protobuf`) encoding.  Successful responses use the request's encoding; failures
//! are always a small JSON object carrying one of a fixed set of error codes.
//!
//! This crate is transport-agnostic.  The [`Server`] turns an `http::Request<Bytes>` into an
//! `http::Response<Bytes>`, and the [`Client`] sends through whatever [`HttpTransport`] it's bound
//! to.  The `twirpox-server` and `twirpox-client` crates connect them to `axum` and `reqwest`
//! respectively.

/// Re-export the exact async-trait macro we use, for compatibility with the generated code
#[doc(hidden)]
pub use async_trait::async_trait;

pub use bytes::Bytes;
pub use http;

mod client;
mod codec;
mod content_type;
mod context;
mod error;
mod route;
mod router;
mod server;
#[cfg(test)]
pub mod testing;
mod transport;

pub use client::{Client, ClientBuilder, ClientConfig, error_from_response};
pub use codec::{CodecError, Message, decode_message, encode_message};
pub use content_type::ContentType;
pub use context::{Context, RequestMetadata, ResponseMetadata};
pub use error::{
    BODY_META_KEY, CAUSE_META_KEY, ErrorCode, INTERMEDIARY_META_KEY, INVALID_ROUTE_META_KEY, IntoTwirpError,
    LOCATION_META_KEY, Result, STATUS_CODE_META_KEY, TwirpError, http_status_from_code,
};
pub use route::{DEFAULT_PREFIX, RouteComponents, build_path, normalize_prefix, validate_route};
pub use router::{Handler, Router};
pub use server::{Server, ServerBuilder, ServerConfig, ServerHooks, Stage1, Stage2, error_response};
pub use transport::{HttpTransport, TransportFn, transport_fn};
