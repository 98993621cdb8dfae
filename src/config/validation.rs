//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and option combinations
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ServiceConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    BindAddress(String),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    MetricsAddress(String),

    #[error("acceptor.keep_alive_period_ms is set but acceptor.keep_alive is false")]
    KeepAlivePeriodWithoutKeepAlive,

    #[error("observability.log_level must not be empty")]
    EmptyLogLevel,
}

/// Check a parsed configuration, collecting every error.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if config.acceptor.keep_alive_period_ms > 0 && !config.acceptor.keep_alive {
        errors.push(ValidationError::KeepAlivePeriodWithoutKeepAlive);
    }

    if config.observability.log_level.trim().is_empty() {
        errors.push(ValidationError::EmptyLogLevel);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
