//! Site configuration.
//!
//! Every component takes an explicit [`SiteConfig`] at construction; nothing
//! reads ambient process-wide state. Values layer as code > env > file >
//! defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Scheme this site is served over. Decides the URLs we hand to remote hosts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

/// Identity and bind settings for one fedlogin site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Display name sent during client registration.
    pub name: String,
    pub description: String,
    /// Public hostname remote hosts will call back to. May carry a port.
    pub hostname: String,
    pub protocol: Protocol,
    pub address: Option<String>,
    pub port: u16,
    /// Key for signing session cookies.
    pub session_secret: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "An unconfigured fedlogin site".to_string(),
            description: "A federated client site that is not correctly configured.".to_string(),
            hostname: "localhost".to_string(),
            protocol: Protocol::Http,
            address: None,
            port: 4000,
            session_secret: "insecure".to_string(),
        }
    }
}

impl SiteConfig {
    /// Minimal config for the given public hostname.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ..Self::default()
        }
    }

    /// Load from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Overlay from environment variables (FEDLOGIN_HOSTNAME, FEDLOGIN_NAME,
    /// FEDLOGIN_PORT, FEDLOGIN_PROTOCOL, FEDLOGIN_SESSION_SECRET). Reads a
    /// `.env` file first if one is present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        if let Ok(hostname) = std::env::var("FEDLOGIN_HOSTNAME") {
            config.hostname = hostname;
        }
        if let Ok(name) = std::env::var("FEDLOGIN_NAME") {
            config.name = name;
        }
        if let Ok(description) = std::env::var("FEDLOGIN_DESCRIPTION") {
            config.description = description;
        }
        if let Ok(port) = std::env::var("FEDLOGIN_PORT") {
            if let Ok(port) = port.parse() {
                config.port = port;
            }
        }
        if let Ok(protocol) = std::env::var("FEDLOGIN_PROTOCOL") {
            if let Ok(protocol) = protocol.parse() {
                config.protocol = protocol;
            }
        }
        if let Ok(secret) = std::env::var("FEDLOGIN_SESSION_SECRET") {
            config.session_secret = secret;
        }
        config
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_session_secret(mut self, secret: impl Into<String>) -> Self {
        self.session_secret = secret.into();
        self
    }

    /// Absolute URL on this site for the given path.
    pub fn url(&self, path: &str) -> String {
        format!("{}://{}{}", self.protocol, self.hostname, path)
    }

    /// User-agent string for outbound requests.
    pub fn user_agent(&self) -> String {
        format!("fedlogin/{}", env!("CARGO_PKG_VERSION"))
    }

    /// Socket address to bind the listener on. Falls back to the hostname,
    /// the way the original dynamic default worked.
    pub fn bind_addr(&self) -> String {
        let address = self.address.as_deref().unwrap_or(&self.hostname);
        format!("{}:{}", address, self.port)
    }
}
