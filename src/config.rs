//! Client configuration.
//!
//! There is no process-wide mutable default: a [`ClientConfig`] is an
//! explicit immutable value handed to each [`Client`](crate::Client),
//! [`Pool`](crate::Pool) or [`Session`](crate::Session) at construction.

use serde_json::{json, Value};
use std::time::Duration;

use crate::options;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL joined with relative request URLs.
    pub base_url: Option<String>,
    /// Default headers applied to every request before per-request headers.
    pub default_headers: Vec<(String, String)>,
    /// User agent string.
    pub user_agent: String,
    /// Default transport option tree, deep-merged under per-request options.
    pub transport_options: Value,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            default_headers: Vec::new(),
            user_agent: format!("volley/{}", env!("CARGO_PKG_VERSION")),
            transport_options: json!({
                "follow_redirects": true,
                "max_redirects": 10,
                "ssl": {
                    "verify_peer": true,
                    "verify_host": true,
                },
            }),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for client configuration.
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the base URL for all requests.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Add a default header for all requests.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.push((name.into(), value.into()));
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the default request timeout.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.transport_option("timeout_ms", json!(timeout.as_millis() as u64))
    }

    /// Set the connection timeout.
    pub fn connect_timeout(self, timeout: Duration) -> Self {
        self.transport_option("connect_timeout_ms", json!(timeout.as_millis() as u64))
    }

    /// Enable or disable following redirects.
    pub fn follow_redirects(self, enable: bool) -> Self {
        self.transport_option("follow_redirects", json!(enable))
    }

    /// Set a single transport option by dotted path.
    pub fn transport_option(mut self, path: &str, value: Value) -> Self {
        options::set(&mut self.config.transport_options, path, value);
        self
    }

    /// Deep-merge a transport option tree over the defaults.
    pub fn transport_options(mut self, tree: Value) -> Self {
        options::deep_merge(&mut self.config.transport_options, tree);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
