use thiserror::Error;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Error building the HTTP client")]
    BuildClient { source: reqwest::Error },

    #[error("Request URI '{uri}' has no scheme or host; configure a base URL on the client")]
    RelativeUri { uri: http::Uri },

    #[error("Error sending request to '{url}': {source}")]
    Send { url: String, source: reqwest::Error },

    #[error("Error reading response body from '{url}': {source}")]
    ReadBody { url: String, source: reqwest::Error },
}
