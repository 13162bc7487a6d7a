//! Twirp, oxidized!
//!
//! `twirpox` implements the [Twirp](https://twitchtv.github.io/twirp/docs/spec_v7.html) RPC
//! protocol: every method of a service is a `POST` endpoint taking and returning a protobuf
//! message, encoded either as JSON or as protobuf binary.
//!
//! Services are usually declared with [`service!`], which generates a trait to implement on the
//! server side, the glue to serve it, and typed clients:
//!
//! ```ignore
//! twirpox::service! {
//!     package example.haberdasher;
//!
//!     service Haberdasher {
//!         rpc MakeHat(Size) returns (Hat);
//!     }
//! }
//!
//! struct HatShop;
//!
//! #[twirpox::async_trait]
//! impl Haberdasher for HatShop {
//!     async fn make_hat(&self, _ctx: twirpox::Context, size: Size) -> twirpox::Result<Hat> {
//!         Ok(Hat { inches: size.inches, ..Default::default() })
//!     }
//! }
//!
//! let app = twirpox::server::into_router(haberdasher_server(HatShop));
//! ```
//!
//! This crate only re-exports the others in the workspace:
//!
//! - `twirpox-proto`: the protocol itself, re-exported at the root of this crate
//! - `twirpox-server` (feature `server`): serving with `axum`, as [`server`]
//! - `twirpox-client` (feature `client`): calling over the network with `reqwest`, as [`client`]
//! - `twirpox-macros` (feature `macros`): the [`service!`] macro

pub use twirpox_proto::*;

#[cfg(feature = "client")]
pub use twirpox_client as client;

#[cfg(feature = "server")]
pub use twirpox_server as server;

#[cfg(feature = "macros")]
pub use twirpox_macros::service;
