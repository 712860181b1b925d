//! Application-level server records.
//!
//! A `ServerConfig` is what the rest of the application consumes once a
//! gateway has been located; discovery results are translated into it.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of server a configuration record points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerType {
    /// UnaMentis gateway process on the local network
    Gateway,

    /// Any other server kind registered by the application
    Custom(String),
}

impl ServerType {
    /// Returns a human-readable description
    pub fn description(&self) -> &str {
        match self {
            ServerType::Gateway => "UnaMentis Gateway",
            ServerType::Custom(_) => "Custom Server",
        }
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerType::Gateway => write!(f, "gateway"),
            ServerType::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// Server configuration record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Unique identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Hostname or IP address
    pub host: String,

    /// Port number
    pub port: u16,

    /// Kind of server
    pub server_type: ServerType,

    /// Whether this server is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Optional tags for categorization
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl ServerConfig {
    /// Creates a new builder for ServerConfig.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Returns `http://{host}:{port}`.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Returns true if both records address the same endpoint.
    pub fn same_endpoint(&self, other: &ServerConfig) -> bool {
        self.host == other.host && self.port == other.port && self.server_type == other.server_type
    }

    /// Validates the server configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("Server name cannot be empty".to_string());
        }

        if self.host.is_empty() {
            return Err("Server host cannot be empty".to_string());
        }

        if self.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        Ok(())
    }
}

/// Builder for ServerConfig.
#[derive(Default)]
pub struct ServerConfigBuilder {
    id: Option<String>,
    name: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    server_type: Option<ServerType>,
    enabled: Option<bool>,
    tags: Vec<String>,
}

impl ServerConfigBuilder {
    /// Sets the identifier (random UUID if unset).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the server name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the server host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the server port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the server type.
    pub fn server_type(mut self, server_type: ServerType) -> Self {
        self.server_type = Some(server_type);
        self
    }

    /// Sets whether the server is enabled.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Adds a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Builds the ServerConfig.
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: self.name.unwrap_or_else(|| "unnamed".to_string()),
            host: self.host.unwrap_or_else(|| "localhost".to_string()),
            port: self.port.unwrap_or(0),
            server_type: self.server_type.unwrap_or(ServerType::Gateway),
            enabled: self.enabled.unwrap_or(true),
            tags: self.tags,
        }
    }
}
