//! Helpers for testing the protocol implementation.
//!
//! This module is only compiled when `test` is enabled.  The integration tests include it by path,
//! so it must not refer to anything in this crate.
use serde::{Deserialize, Serialize};

/// Initialize tracing with a subscriber and some reasonable defaults suitable for enabling log
/// output in tests.
///
/// This is idempotent; it can be called from multiple tests in multiple threads but will only
/// initialize tracing once.
pub fn init_test_logging() {
    use std::sync::OnceLock;

    const DEFAULT_LOG_FILTER: &str = "debug";
    static INIT_LOGGING: OnceLock<()> = OnceLock::new();

    INIT_LOGGING.get_or_init(|| {
        tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
            .with_test_writer()
            .try_init()
            .unwrap()
    });
}

/// Size of a hat, in inches.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Size {
    #[prost(int32, tag = "1")]
    pub inches: i32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct Hat {
    #[prost(int32, tag = "1")]
    pub inches: i32,
    #[prost(string, tag = "2")]
    pub color: String,
    #[prost(string, tag = "3")]
    pub name: String,
}

/// Request of the `pkg.Svc/Method` method used to exercise the dispatchers end to end.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodRequest {
    #[prost(int32, tag = "1")]
    pub x: i32,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodResponse {
    #[prost(int32, tag = "1")]
    pub y: i32,
}
