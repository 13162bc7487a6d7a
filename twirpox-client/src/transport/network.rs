use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use twirpox_proto::HttpTransport;

use crate::{ClientError, Result};

/// Settings of the HTTP client behind a [`ReqwestTransport`].
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReqwestTransportConfig {
    /// Limit on the whole request, from connecting to reading the last byte of the response.
    ///
    /// Written in humantime form in config files, e.g. `"5s"` or `"1m 30s"`.  `None` means no
    /// limit.
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,

    /// Limit on establishing the connection alone.  `None` means no limit beyond `timeout`.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,

    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl Default for ReqwestTransportConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: None,
            user_agent: concat!("twirpox/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Sends requests over the network using [`reqwest`].
///
/// Cheap to clone; clones share the same connection pool.  Requests must have absolute URIs, so
/// the client using this transport needs a base URL.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        Self::with_config(&ReqwestTransportConfig::default())
    }

    pub fn with_config(config: &ReqwestTransportConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            // Redirects must reach the protocol client, which reports them as errors
            .redirect(reqwest::redirect::Policy::none());

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }

        tracing::debug!(
            timeout = %config
                .timeout
                .map(|timeout| humantime::format_duration(timeout).to_string())
                .unwrap_or_else(|| "none".to_string()),
            user_agent = %config.user_agent,
            "Building HTTP client"
        );
        let client = builder
            .build()
            .map_err(|source| ClientError::BuildClient { source })?;

        Ok(Self { client })
    }

    /// Use an already-configured `reqwest` client, e.g. one shared with the rest of the
    /// application.
    ///
    /// Note that a client that follows redirects hides them from the protocol client, which would
    /// otherwise report them as errors.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send_request(&self, request: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let (parts, body) = request.into_parts();
        if parts.uri.scheme().is_none() || parts.uri.host().is_none() {
            return Err(ClientError::RelativeUri { uri: parts.uri });
        }
        let url = parts.uri.to_string();

        let response = self
            .client
            .request(parts.method, &url)
            .headers(parts.headers)
            .body(body)
            .send()
            .await
            .map_err(|source| ClientError::Send {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|source| ClientError::ReadBody { url, source })?;

        tracing::trace!(status = status.as_u16(), len = body.len(), "Received response");

        let mut response = http::Response::new(body);
        *response.status_mut() = status;
        *response.version_mut() = version;
        *response.headers_mut() = headers;

        Ok(response)
    }
}

impl HttpTransport for ReqwestTransport {
    type Error = ClientError;

    fn send(
        &self,
        request: http::Request<Bytes>,
    ) -> impl Future<Output = Result<http::Response<Bytes>, Self::Error>> + Send {
        self.send_request(request)
    }
}
