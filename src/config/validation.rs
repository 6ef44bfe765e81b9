//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check value ranges and cross-field consistency
//! - Verify TLS host entries are unique and cover the default host
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: `EndpointConfig → Result<(), Vec<ValidationError>>`
//! - Runs before a config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::EndpointConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("bind_address {0:?} is not a valid socket address")]
    InvalidBindAddress(String),
    #[error("acceptor_count must be at least 1")]
    NoAcceptors,
    #[error("max_connections must be -1 (unlimited) or non-negative, got {0}")]
    InvalidMaxConnections(i64),
    #[error("accept_backlog must be at least 1")]
    NoBacklog,
    #[error("workers.max must be at least 1")]
    NoWorkers,
    #[error("workers.core ({core}) exceeds workers.max ({max})")]
    WorkerSizesInverted { core: usize, max: usize },
    #[error("workers.queue_capacity must be at least 1")]
    NoQueueCapacity,
    #[error("TLS host entry {0} has an empty host name")]
    EmptyTlsHostName(usize),
    #[error("duplicate TLS host configuration for {0:?}")]
    DuplicateTlsHost(String),
    #[error("default TLS host {0:?} has no matching tls_hosts entry")]
    MissingDefaultTlsHost(String),
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &EndpointConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.bind_address.clone(),
        ));
    }
    if config.acceptor_count == 0 {
        errors.push(ValidationError::NoAcceptors);
    }
    if config.max_connections < -1 {
        errors.push(ValidationError::InvalidMaxConnections(
            config.max_connections,
        ));
    }
    if config.accept_backlog == 0 {
        errors.push(ValidationError::NoBacklog);
    }
    if config.workers.max == 0 {
        errors.push(ValidationError::NoWorkers);
    } else if config.workers.core > config.workers.max {
        errors.push(ValidationError::WorkerSizesInverted {
            core: config.workers.core,
            max: config.workers.max,
        });
    }
    if config.workers.queue_capacity == 0 {
        errors.push(ValidationError::NoQueueCapacity);
    }

    let mut seen_hosts = HashSet::new();
    for (index, host) in config.tls_hosts.iter().enumerate() {
        if host.host_name.is_empty() {
            errors.push(ValidationError::EmptyTlsHostName(index));
        } else if !seen_hosts.insert(host.host_name.as_str()) {
            errors.push(ValidationError::DuplicateTlsHost(host.host_name.clone()));
        }
    }
    if !config.tls_hosts.is_empty() && !seen_hosts.contains(config.default_tls_host.as_str()) {
        errors.push(ValidationError::MissingDefaultTlsHost(
            config.default_tls_host.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
