//! The canonical error model shared by both ends of a call.
//!
//! Every failure, whatever its origin, is eventually expressed as a [`TwirpError`]: one of the
//! closed set of [`ErrorCode`]s, a human-readable message, and a map of string metadata.  The
//! mapping from code to HTTP status is part of the wire contract, so it lives here as a plain
//! `match` and is deliberately not configurable.
use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T, E = TwirpError> = std::result::Result<T, E>;

/// Metadata key set on `bad_route` errors, holding `"<HTTP verb> <path>"` of the rejected request.
pub const INVALID_ROUTE_META_KEY: &str = "twirp_invalid_route";

/// Metadata key naming the underlying failure of an `internal` error.
pub const CAUSE_META_KEY: &str = "cause";

/// Metadata keys the client sets on errors it synthesizes from non-protocol HTTP responses.
pub const INTERMEDIARY_META_KEY: &str = "http_error_from_intermediary";
pub const STATUS_CODE_META_KEY: &str = "status_code";
pub const BODY_META_KEY: &str = "body";
pub const LOCATION_META_KEY: &str = "location";

/// Canonical error codes.
///
/// The string form (via [`std::fmt::Display`] / [`std::str::FromStr`]) is the exact value used on
/// the wire.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::EnumString,
    strum::IntoStaticStr,
    strum::Display,
    strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCode {
    /// Sentinel for "no error".  Exists only so that the wire value `""` has a name; application
    /// code must never build a [`TwirpError`] with it.
    #[strum(serialize = "")]
    NoError,
    Canceled,
    Unknown,
    InvalidArgument,
    Malformed,
    DeadlineExceeded,
    NotFound,
    BadRoute,
    AlreadyExists,
    PermissionDenied,
    Unauthenticated,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
}

impl ErrorCode {
    /// The wire representation of this code.
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Parse a wire code, returning `None` if it's not one of the canonical codes.
    pub fn from_wire(code: &str) -> Option<Self> {
        code.parse().ok()
    }

    /// HTTP status that a server responds with when failing with this code.
    pub const fn http_status(self) -> u16 {
        match self {
            ErrorCode::NoError => 200,
            ErrorCode::Canceled => 408,
            ErrorCode::Unknown => 500,
            ErrorCode::InvalidArgument => 400,
            ErrorCode::Malformed => 400,
            ErrorCode::DeadlineExceeded => 408,
            ErrorCode::NotFound => 404,
            ErrorCode::BadRoute => 404,
            ErrorCode::AlreadyExists => 409,
            ErrorCode::PermissionDenied => 403,
            ErrorCode::Unauthenticated => 401,
            ErrorCode::ResourceExhausted => 429,
            ErrorCode::FailedPrecondition => 412,
            ErrorCode::Aborted => 409,
            ErrorCode::OutOfRange => 400,
            ErrorCode::Unimplemented => 501,
            ErrorCode::Internal => 500,
            ErrorCode::Unavailable => 503,
            ErrorCode::DataLoss => 500,
        }
    }

    /// Best-guess code for an HTTP status that was produced by something other than a peer
    /// speaking this protocol (a proxy, a load balancer, ...).
    pub const fn from_intermediary_status(status: u16) -> Self {
        match status {
            400 => ErrorCode::Internal,
            401 => ErrorCode::Unauthenticated,
            403 => ErrorCode::PermissionDenied,
            404 => ErrorCode::BadRoute,
            429 => ErrorCode::ResourceExhausted,
            502..=504 => ErrorCode::Unavailable,
            _ => ErrorCode::Unknown,
        }
    }
}

/// HTTP status for an arbitrary wire code string.
///
/// Returns `0` for anything that isn't a canonical code, which callers must treat as "invalid, do
/// not use".
pub fn http_status_from_code(code: &str) -> u16 {
    ErrorCode::from_wire(code).map(ErrorCode::http_status).unwrap_or(0)
}

/// An error as defined by the protocol, either produced locally or received from a peer.
///
/// Values are immutable.  Metadata is shared between clones and copied on write, so deriving an
/// error with [`TwirpError::with_meta`] never changes the error it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("twirp error {code}: {msg}")]
pub struct TwirpError {
    code: ErrorCode,
    msg: String,
    meta: Arc<BTreeMap<String, String>>,
}

impl TwirpError {
    pub fn new(code: ErrorCode, msg: impl Into<String>) -> Self {
        debug_assert_ne!(code, ErrorCode::NoError, "errors must not use the no_error code");

        Self {
            code,
            msg: msg.into(),
            meta: Arc::default(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn msg(&self) -> &str {
        &self.msg
    }

    /// Look up a single metadata value.  Absent keys are `None`.
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    pub fn meta_map(&self) -> &BTreeMap<String, String> {
        &self.meta
    }

    /// HTTP status corresponding to this error's code.
    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Return a copy of this error with one more metadata entry.
    ///
    /// `self` is left untouched; an existing value for `key` is replaced in the copy only.
    #[must_use]
    pub fn with_meta(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut derived = self.clone();
        Arc::make_mut(&mut derived.meta).insert(key.into(), value.into());
        derived
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, msg)
    }

    /// An `invalid_argument` error about one named argument.
    pub fn invalid_argument(argument: &str, validation_msg: &str) -> Self {
        Self::new(ErrorCode::InvalidArgument, format!("{argument} {validation_msg}"))
            .with_meta("argument", argument)
    }

    /// An `invalid_argument` error for a required argument that was missing.
    pub fn required_argument(argument: &str) -> Self {
        Self::invalid_argument(argument, "is required")
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, msg)
    }

    /// Wrap some other error as an `internal` error, recording its type name as `cause`.
    pub fn internal_with<E: std::error::Error>(err: &E) -> Self {
        Self::internal(err.to_string()).with_meta(CAUSE_META_KEY, std::any::type_name::<E>())
    }

    /// Like [`Self::internal_with`], with the message prefixed by some context.
    pub fn wrap_internal<E: std::error::Error>(err: &E, context: &str) -> Self {
        Self::internal(format!("{context}: {err}")).with_meta(CAUSE_META_KEY, std::any::type_name::<E>())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Malformed, msg)
    }

    /// A `bad_route` error for the request `<http_method> <path>`.
    pub fn bad_route(msg: impl Into<String>, http_method: &http::Method, path: &str) -> Self {
        Self::new(ErrorCode::BadRoute, msg).with_meta(INVALID_ROUTE_META_KEY, format!("{http_method} {path}"))
    }

    pub fn unimplemented(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unimplemented, msg)
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unavailable, msg)
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, msg)
    }

    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthenticated, msg)
    }

    /// Serialize to the JSON error body, `{"code", "msg", "meta"?}`.
    pub fn to_json_body(&self) -> Bytes {
        match serde_json::to_vec(self) {
            Ok(body) => body.into(),
            Err(e) => {
                // A struct of strings can't really fail to serialize, but if it somehow does the
                // peer still needs a well-formed body
                tracing::error!(error = %e, "Failed to serialize error body");
                Bytes::from_static(br#"{"code":"internal","msg":"failed to serialize error"}"#)
            }
        }
    }

    /// Parse a JSON error body received from a peer.
    ///
    /// Only the keys `code`, `msg` and `meta` are accepted, metadata must be string to string, and
    /// the code must be canonical.  Anything else is not a protocol error body and yields `None`.
    pub fn from_json_body(body: &[u8]) -> Option<Self> {
        let wire: WireErrorOwned = serde_json::from_slice(body).ok()?;
        let code = ErrorCode::from_wire(&wire.code)?;

        Some(Self {
            code,
            msg: wire.msg,
            meta: Arc::new(wire.meta.unwrap_or_default()),
        })
    }
}

impl Serialize for TwirpError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireError {
            code: self.code.as_str(),
            msg: &self.msg,
            meta: &self.meta,
        }
        .serialize(serializer)
    }
}

#[derive(Serialize)]
struct WireError<'a> {
    code: &'a str,
    msg: &'a str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    meta: &'a BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WireErrorOwned {
    code: String,
    msg: String,
    #[serde(default)]
    meta: Option<BTreeMap<String, String>>,
}

/// Anything a handler can fail with.
///
/// Handlers that already speak in terms of [`TwirpError`] pass through unchanged.  The other
/// implementations exist so handlers can use `?` on arbitrary errors: those are unwrapped if they
/// carry a [`TwirpError`] inside, and otherwise become `internal` errors.
pub trait IntoTwirpError {
    fn into_twirp_error(self) -> TwirpError;
}

impl IntoTwirpError for TwirpError {
    fn into_twirp_error(self) -> TwirpError {
        self
    }
}

impl IntoTwirpError for anyhow::Error {
    fn into_twirp_error(self) -> TwirpError {
        match self.downcast::<TwirpError>() {
            Ok(err) => err,
            Err(err) => {
                // The full chain stays in the local log, only the summary goes on the wire
                tracing::error!(error = ?err, "Handler failed with a non-protocol error");
                TwirpError::internal(err.to_string())
                    .with_meta(CAUSE_META_KEY, erased_type_name(err.root_cause(), "anyhow::Error"))
            }
        }
    }
}

impl IntoTwirpError for Box<dyn std::error::Error + Send + Sync> {
    fn into_twirp_error(self) -> TwirpError {
        match self.downcast::<TwirpError>() {
            Ok(err) => *err,
            Err(err) => {
                tracing::error!(error = ?err, "Handler failed with a non-protocol error");
                TwirpError::internal(err.to_string())
                    .with_meta(CAUSE_META_KEY, erased_type_name(&*err, "Box<dyn Error>"))
            }
        }
    }
}

/// Best-effort name of the concrete type behind a type-erased error.
///
/// `type_name` only sees `dyn Error` here, so the name is taken from the leading identifier of the
/// `Debug` output, which is the type name for derived `Debug` on structs (for enums it's the
/// variant).  Errors whose `Debug` doesn't start with an identifier, such as ad hoc string errors,
/// get `fallback`.
fn erased_type_name(err: &(dyn std::error::Error + 'static), fallback: &str) -> String {
    // io::Error's Debug starts with its private repr, which names nothing useful
    if err.is::<std::io::Error>() {
        return std::any::type_name::<std::io::Error>().to_string();
    }

    let debug = format!("{err:?}");
    let name: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();

    if name.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        name
    } else {
        fallback.to_string()
    }
}

impl IntoTwirpError for std::convert::Infallible {
    fn into_twirp_error(self) -> TwirpError {
        match self {}
    }
}
