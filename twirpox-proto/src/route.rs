//! Every method of a service is exposed at exactly one path,
//! `[/<prefix>]/<package>.<Service>/<Method>`.  This module turns request paths into their
//! components, checks them against what a server expects, and builds them for clients.
use http::Method;
use itertools::Itertools;
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

use crate::{Result, TwirpError};

/// Path prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "twirp";

/// Characters escaped when a value is written into a single path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// The parts of a request path that identify the method being called.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RouteComponents {
    /// Everything before the service, without the leading `/`.  Empty when there is no prefix.
    pub prefix: String,
    /// `<package>.<Service>`, or just `<Service>` for services without a package.
    pub service_id: String,
    pub method: String,
}

impl RouteComponents {
    /// Split a path from the right: the last segment is the method, the one before it the service,
    /// and whatever precedes them is the prefix.
    ///
    /// Paths with fewer than two segments produce empty components, which will never match any
    /// service.
    pub fn parse(path: &str) -> Self {
        let segments = path.split('/').collect::<Vec<_>>();
        if segments.len() < 2 {
            return Self::default();
        }

        let (head, tail) = segments.split_at(segments.len() - 2);
        let prefix = head.join("/");
        let prefix = prefix.strip_prefix('/').unwrap_or(&prefix);

        Self {
            prefix: decode_component(prefix),
            service_id: decode_component(tail[0]),
            method: decode_component(tail[1]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty() && self.service_id.is_empty() && self.method.is_empty()
    }

    /// The path that [`Self::parse`] would turn back into these components.
    pub fn to_path(&self) -> String {
        build_path(&self.prefix, &self.service_id, &self.method)
    }
}

/// Build the path for a method, percent-encoding each component.
///
/// A prefix may span several segments (`"api/twirp"`); an empty prefix produces
/// `/<service_id>/<method>`.
pub fn build_path(prefix: &str, service_id: &str, method: &str) -> String {
    let prefix = prefix
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(encode_component)
        .join("/");
    let service_id = encode_component(service_id);
    let method = encode_component(method);

    if prefix.is_empty() {
        format!("/{service_id}/{method}")
    } else {
        format!("/{prefix}/{service_id}/{method}")
    }
}

/// Resolve the configured prefix: unset means [`DEFAULT_PREFIX`], and surrounding slashes are
/// ignored so that `"/twirp/"` and `"twirp"` are the same prefix.
pub fn normalize_prefix(prefix: Option<&str>) -> String {
    prefix.unwrap_or(DEFAULT_PREFIX).trim_matches('/').to_string()
}

/// Check a parsed route against the service a server is serving.
///
/// The checks run in a fixed order and stop at the first mismatch: verb, then service, then
/// prefix.  All failures are `bad_route` errors tagged with the request's verb and path.
pub fn validate_route(
    http_method: &Method,
    path: &str,
    route: &RouteComponents,
    expected_prefix: &str,
    expected_service_id: &str,
) -> Result<()> {
    if *http_method != Method::POST {
        return Err(TwirpError::bad_route(
            format!("unsupported method {http_method} (only POST is allowed)"),
            http_method,
            path,
        ));
    }

    if route.service_id != expected_service_id {
        return Err(TwirpError::bad_route(
            format!("no handler for path {path}"),
            http_method,
            path,
        ));
    }

    if route.prefix != expected_prefix {
        return Err(TwirpError::bad_route(
            format!(
                "invalid path prefix {}, expected {expected_prefix}, on path {path}",
                route.prefix
            ),
            http_method,
            path,
        ));
    }

    Ok(())
}

fn encode_component(component: &str) -> String {
    utf8_percent_encode(component, PATH_SEGMENT).to_string()
}

fn decode_component(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}
