//! # UnaMentis Core
//!
//! Application-level types, error handling, and configuration shared by the
//! gateway discovery subsystem and its consumers.
//!
//! - **Types**: `ServerConfig` and `ServerType`, the application's record of a
//!   registered server.
//! - **Store**: the `ServerConfigStore` collaborator that successful discoveries
//!   are registered into, plus an in-memory implementation.
//! - **Configuration**: YAML files with `UNAMENTIS__*` environment overrides,
//!   including the discovery tier settings.
//!
//! ## Example
//!
//! ```
//! use unamentis_core::types::{ServerConfig, ServerType};
//!
//! let server = ServerConfig::builder()
//!     .name("Living Room Mac")
//!     .host("192.168.1.100")
//!     .port(11400)
//!     .server_type(ServerType::Gateway)
//!     .build();
//!
//! assert!(server.validate().is_ok());
//! assert_eq!(server.base_url(), "http://192.168.1.100:11400");
//! ```

pub mod config;
pub mod discovery_config;
pub mod error;
pub mod store;
pub mod types;

pub use config::AppConfig;
pub use error::{CoreError, Result};
pub use store::{InMemoryServerConfigStore, ServerConfigStore};
pub use types::{ServerConfig, ServerType};
