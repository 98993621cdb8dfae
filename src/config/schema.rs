//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Root configuration for the accept service.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Admission limit, per-connection deadlines and keep-alive.
    pub acceptor: AcceptorConfig,

    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:7000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:7000".to_string(),
        }
    }
}

/// Acceptor behaviour. Zero disables a limit or deadline.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct AcceptorConfig {
    /// Maximum concurrently handled connections (0 = unbounded).
    pub max_concurrent: usize,

    /// Read deadline from dispatch, in milliseconds.
    pub read_timeout_ms: u64,

    /// Write deadline from dispatch, in milliseconds.
    pub write_timeout_ms: u64,

    /// Initial idle deadline, in milliseconds. Handlers re-arm it per read.
    pub idle_timeout_ms: u64,

    /// Enable TCP keep-alive on accepted connections.
    pub keep_alive: bool,

    /// Idle time before the first keep-alive probe (0 = OS default).
    pub keep_alive_period_ms: u64,
}

impl AcceptorConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn keep_alive_period(&self) -> Duration {
        Duration::from_millis(self.keep_alive_period_ms)
    }
}

/// Graceful shutdown settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long to wait for in-flight connections after stop, in milliseconds.
    pub grace_period_ms: u64,
}

impl ShutdownConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 30_000,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log filter (e.g., "info", "graceful_acceptor=debug").
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
