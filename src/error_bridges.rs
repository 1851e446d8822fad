//! Error bridge implementations for run-level errors.
//!
//! This module provides `impl From<X> for MendError` conversions from the
//! error types of the root crate (config, fault input, storage) to the
//! unified `MendError` type.
//!
//! These bridges live in the root crate rather than `mendtool-core` because
//! the error types they convert are defined here.

use mendtool_core::error::MendError;

use crate::config::ConfigError;
use crate::fault::FaultError;
use crate::store::StoreError;

// ============================================================================
// Bridge: ConfigError -> MendError
// ============================================================================

impl From<ConfigError> for MendError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io { path, source } if source.kind() == std::io::ErrorKind::NotFound => {
                MendError::file_not_found(path.display().to_string())
            }
            other => MendError::invalid_args(other.to_string()),
        }
    }
}

// ============================================================================
// Bridge: FaultError -> MendError
// ============================================================================

impl From<FaultError> for MendError {
    fn from(err: FaultError) -> Self {
        match err {
            FaultError::Io { path, source } if source.kind() == std::io::ErrorKind::NotFound => {
                MendError::file_not_found(path.display().to_string())
            }
            FaultError::Io { path, source } => MendError::storage(path.display().to_string(), source.to_string()),
            malformed @ FaultError::Malformed { .. } => MendError::invalid_args(malformed.to_string()),
        }
    }
}

// ============================================================================
// Bridge: StoreError -> MendError
// ============================================================================

impl From<StoreError> for MendError {
    fn from(err: StoreError) -> Self {
        let path = err.path().display().to_string();
        let message = match &err {
            StoreError::Io { source, .. } => source.to_string(),
            StoreError::Serialize { source, .. } => source.to_string(),
        };
        MendError::storage(path, message)
    }
}
