//! Client configuration.
//!
//! Provides [`ClientConfig`] for configuring an XML-RPC [`Client`](crate::Client).
//! Values are loaded from environment variables or built programmatically.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Default endpoint when none is configured.
pub const DEFAULT_URL: &str = "http://localhost:8080/RPC2";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

fn default_user_agent() -> String {
    format!("xmlrpc-client/{}", env!("CARGO_PKG_VERSION"))
}

/// XML-RPC client configuration.
///
/// # Examples
///
/// ```
/// use xmlrpc_client::config::ClientConfig;
///
/// let config = ClientConfig::for_url("http://example.com/RPC2");
/// assert_eq!(config.timeout_secs, 60);
/// assert!(config.keep_alive);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Endpoint receiving the POSTed calls.
    #[builder(default = String::from(DEFAULT_URL))]
    pub url: String,

    /// Whole-request timeout in seconds.
    #[builder(default = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// `User-Agent` header value.
    #[builder(default = default_user_agent())]
    pub user_agent: String,

    /// Send `Connection: Keep-Alive`.
    #[builder(default = true)]
    pub keep_alive: bool,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: String::from(DEFAULT_URL),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: default_user_agent(),
            keep_alive: true,
            log_level: String::from("info"),
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at `url`.
    #[must_use]
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `XMLRPC_URL` | `http://localhost:8080/RPC2` |
    /// | `XMLRPC_TIMEOUT` | `60` |
    /// | `XMLRPC_USER_AGENT` | `xmlrpc-client/<version>` |
    /// | `XMLRPC_KEEP_ALIVE` | `true` |
    /// | `LOG_LEVEL` | `info` |
    ///
    /// Unparseable numbers keep the default.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("XMLRPC_URL") {
            config.url = v;
        }
        if let Ok(v) = std::env::var("XMLRPC_TIMEOUT") {
            if let Ok(n) = v.parse::<u64>() {
                config.timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("XMLRPC_USER_AGENT") {
            config.user_agent = v;
        }
        if let Ok(v) = std::env::var("XMLRPC_KEEP_ALIVE") {
            config.keep_alive = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }

        config
    }
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
