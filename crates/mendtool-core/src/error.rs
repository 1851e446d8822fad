//! Error types and error code constants for mend.
//!
//! `MendError` is the single error type surfaced by the CLI. Subsystem
//! errors (`PoolError`, `FrontEndError`, ...) bridge into it through `From`
//! impls, and every variant maps to a stable [`OutputErrorCode`] that becomes
//! the process exit code.
//!
//! ## Error Code Mapping
//!
//! - `2`: Invalid arguments (bad input from caller, malformed config)
//! - `3`: Resolution errors (file or class not found, unparsable source)
//! - `4`: Storage errors (pool or candidate directories unusable)
//! - `5`: Verification infrastructure failed (compiler or runner unusable)
//! - `10`: Internal errors (bugs, unexpected state)
//!
//! Search outcomes such as "not applied" or "test failure" are values, not
//! errors, and never reach this type.

use std::fmt;

use thiserror::Error;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Error codes for JSON output and process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from caller.
    InvalidArguments = 2,
    /// Something named by the caller could not be found or read.
    ResolutionError = 3,
    /// Pool or candidate storage could not be written or read.
    StorageError = 4,
    /// The compile/test infrastructure could not be used.
    VerificationFailed = 5,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum MendError {
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    #[error("file not found: {path}")]
    FileNotFound { path: String },

    #[error("cannot parse {path}: {message}")]
    ParseFailed { path: String, message: String },

    #[error("storage error at {path}: {message}")]
    Storage { path: String, message: String },

    #[error("verification infrastructure failed ({stage}): {message}")]
    VerificationFailed { stage: String, message: String },

    #[error("internal error: {message}")]
    InternalError { message: String },
}

impl From<&MendError> for OutputErrorCode {
    fn from(err: &MendError) -> Self {
        match err {
            MendError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            MendError::FileNotFound { .. } => OutputErrorCode::ResolutionError,
            MendError::ParseFailed { .. } => OutputErrorCode::ResolutionError,
            MendError::Storage { .. } => OutputErrorCode::StorageError,
            MendError::VerificationFailed { .. } => OutputErrorCode::VerificationFailed,
            MendError::InternalError { .. } => OutputErrorCode::InternalError,
        }
    }
}

// ============================================================================
// Bridges
// ============================================================================

impl From<crate::pool::PoolError> for MendError {
    fn from(err: crate::pool::PoolError) -> Self {
        use crate::pool::PoolError;
        match err {
            PoolError::Io { path, source } => MendError::Storage {
                path: path.display().to_string(),
                message: source.to_string(),
            },
            PoolError::Corrupt { path, reason } => MendError::Storage {
                path: path.display().to_string(),
                message: format!("corrupt pool data: {}", reason),
            },
            PoolError::UnknownChange { id } => MendError::InternalError {
                message: format!("change id {} is not in the pool", id),
            },
        }
    }
}

impl From<crate::frontend::FrontEndError> for MendError {
    fn from(err: crate::frontend::FrontEndError) -> Self {
        MendError::ParseFailed {
            path: "<source>".to_string(),
            message: err.to_string(),
        }
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl MendError {
    pub fn invalid_args(message: impl Into<String>) -> Self {
        MendError::InvalidArguments {
            message: message.into(),
        }
    }

    pub fn file_not_found(path: impl Into<String>) -> Self {
        MendError::FileNotFound { path: path.into() }
    }

    pub fn storage(path: impl Into<String>, message: impl Into<String>) -> Self {
        MendError::Storage {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn verification(stage: impl Into<String>, message: impl Into<String>) -> Self {
        MendError::VerificationFailed {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        MendError::InternalError {
            message: message.into(),
        }
    }

    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }
}

// ============================================================================
// Tests
// ============================================================================
