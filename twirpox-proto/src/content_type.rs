//! The two encodings a request or response body can use, and how the server picks one from the
//! request headers.
use http::{HeaderMap, Method, header::CONTENT_TYPE};

use crate::{Result, TwirpError};

/// Content types understood by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// `application/json`
    Json,
    /// `application/protobuf`
    Protobuf,
}

impl ContentType {
    pub const fn as_str(self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::Protobuf => "application/protobuf",
        }
    }

    /// Short name used in error messages.
    pub const fn label(self) -> &'static str {
        match self {
            ContentType::Json => "json",
            ContentType::Protobuf => "protobuf",
        }
    }

    /// Interpret a `Content-Type` header value.
    ///
    /// Only the media type before the first `;` is considered, so parameters like
    /// `charset=utf-8` are tolerated.  This is the single place content types are parsed.
    pub fn from_header_value(value: &str) -> Option<Self> {
        let media_type = value.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();

        match media_type.as_str() {
            "application/json" => Some(ContentType::Json),
            "application/protobuf" => Some(ContentType::Protobuf),
            _ => None,
        }
    }

    /// Pick the content type of an inbound request from its headers.
    ///
    /// A missing or unrecognized `Content-Type` is a `bad_route` error for the request
    /// `<http_method> <path>`.
    pub fn negotiate(headers: &HeaderMap, http_method: &Method, path: &str) -> Result<Self> {
        let value = headers
            .get(CONTENT_TYPE)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .unwrap_or_default();

        match Self::from_header_value(&value) {
            Some(content_type) => Ok(content_type),
            None => Err(TwirpError::bad_route(
                format!("unexpected Content-Type: {value}"),
                http_method,
                path,
            )),
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
