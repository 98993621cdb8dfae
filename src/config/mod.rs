//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → acceptor::Options (durations, limits) at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the acceptor copies what it needs
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{AcceptorConfig, ListenerConfig, ObservabilityConfig, ServiceConfig, ShutdownConfig};
