// ABOUTME: Top-level error type for the dispatch core
// ABOUTME: Wraps store, session and configuration failures behind a single enum

use crate::config::ConfigError;
use crate::session::SmppError;
use crate::store::StoreError;
use thiserror::Error;

/// Error type for gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Queue store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Session failure
    #[error("Session error: {0}")]
    Session(#[from] SmppError),

    /// Configuration failure
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Token text could not be turned into user data
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Operation not valid in the gateway's current lifecycle state
    #[error("Invalid gateway state: {0}")]
    InvalidState(&'static str),
}

impl GatewayError {
    /// Transport failures that leave the current token leased for redelivery.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Session(e) if e.is_transient())
    }
}

/// Result type alias using GatewayError.
pub type GatewayResult<T> = Result<T, GatewayError>;
