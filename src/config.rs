//! Provider configuration.
//!
//! Decoded from the host's `Configure` payload. Connection fields left unset
//! fall back to `OME_*` environment variables so credentials can stay out
//! of configuration files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema};
use crate::types::strip_nulls;

/// Environment variable consulted when `host` is unset.
pub const ENV_HOST: &str = "OME_HOST";
/// Environment variable consulted when `username` is unset.
pub const ENV_USERNAME: &str = "OME_USERNAME";
/// Environment variable consulted when `password` is unset.
pub const ENV_PASSWORD: &str = "OME_PASSWORD";
/// Environment variable consulted when `port` is unset.
pub const ENV_PORT: &str = "OME_PORT";

const DEFAULT_PORT: u16 = 443;
const DEFAULT_PROTOCOL: &str = "https";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for one OME appliance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Appliance hostname or IP address.
    pub host: String,
    /// Account used to open API sessions.
    pub username: String,
    /// Password for `username`.
    #[serde(skip_serializing)]
    pub password: String,
    /// HTTPS port.
    pub port: u16,
    /// `https` or `http`.
    pub protocol: String,
    /// Accept self-signed certificates.
    pub skipssl: bool,
    /// Per-request timeout, in seconds.
    pub timeout: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: String::new(),
            password: String::new(),
            port: DEFAULT_PORT,
            protocol: DEFAULT_PROTOCOL.to_string(),
            skipssl: false,
            timeout: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ProviderConfig {
    /// Decode the host payload and fill unset fields from the process
    /// environment.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::from_value_with_env(value, |key| std::env::var(key).ok())
    }

    /// Like [`from_value`](Self::from_value) with an explicit environment
    /// lookup.
    pub fn from_value_with_env(
        value: serde_json::Value,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, serde_json::Error> {
        let mut config: ProviderConfig = if value.is_null() {
            ProviderConfig::default()
        } else {
            serde_json::from_value(strip_nulls(value))?
        };

        if config.host.is_empty() {
            config.host = env(ENV_HOST).unwrap_or_default();
        }
        if config.username.is_empty() {
            config.username = env(ENV_USERNAME).unwrap_or_default();
        }
        if config.password.is_empty() {
            config.password = env(ENV_PASSWORD).unwrap_or_default();
        }
        if config.port == DEFAULT_PORT {
            if let Some(port) = env(ENV_PORT).and_then(|p| p.parse().ok()) {
                config.port = port;
            }
        }

        Ok(config)
    }

    /// Check the settings, returning one diagnostic per problem.
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        if self.host.trim().is_empty() {
            diagnostics.push(
                Diagnostic::error("Missing OME host")
                    .with_detail(format!("Set host or the {} environment variable", ENV_HOST))
                    .with_attribute("host"),
            );
        }
        if self.username.is_empty() {
            diagnostics.push(
                Diagnostic::error("Missing OME username")
                    .with_detail(format!("Set username or {}", ENV_USERNAME))
                    .with_attribute("username"),
            );
        }
        if self.password.is_empty() {
            diagnostics.push(
                Diagnostic::error("Missing OME password")
                    .with_detail(format!("Set password or {}", ENV_PASSWORD))
                    .with_attribute("password"),
            );
        }
        if self.port == 0 {
            diagnostics.push(Diagnostic::error("Port must be non-zero").with_attribute("port"));
        }
        if self.protocol != "https" && self.protocol != "http" {
            diagnostics.push(
                Diagnostic::error(format!("Unsupported protocol '{}'", self.protocol))
                    .with_detail("Expected https or http")
                    .with_attribute("protocol"),
            );
        }
        if self.timeout == 0 {
            diagnostics.push(Diagnostic::error("Timeout must be positive").with_attribute("timeout"));
        }

        diagnostics
    }

    /// Base URL of the appliance, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host.trim(), self.port)
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Schema of the provider configuration block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("Connection to an OpenManage Enterprise appliance")
            .with_attribute(
                "host",
                Attribute::optional_string()
                    .with_description("Appliance hostname or IP address, or OME_HOST"),
            )
            .with_attribute(
                "username",
                Attribute::optional_string().with_description("API user, or OME_USERNAME"),
            )
            .with_attribute(
                "password",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("API password, or OME_PASSWORD"),
            )
            .with_attribute(
                "port",
                Attribute::new(AttributeType::Int64, AttributeFlags::optional())
                    .with_default(serde_json::json!(DEFAULT_PORT)),
            )
            .with_attribute(
                "protocol",
                Attribute::optional_string().with_default(serde_json::json!(DEFAULT_PROTOCOL)),
            )
            .with_attribute(
                "skipssl",
                Attribute::optional_bool().with_default(serde_json::json!(false)),
            )
            .with_attribute(
                "timeout",
                Attribute::optional_int64()
                    .with_description("Per-request timeout in seconds")
                    .with_default(serde_json::json!(DEFAULT_TIMEOUT_SECS)),
            )
    }
}
