//! Error taxonomy for the engine, matching the propagation policy in the
//! design: lane failures degrade and log, only storage/invariant failures
//! become a hard error back to the caller.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation: {message}")]
    Validation {
        message: String,
        detail: Option<serde_json::Value>,
    },

    #[error("not found: {message}")]
    NotFound {
        message: String,
        detail: Option<serde_json::Value>,
    },

    #[error("conflict: {message}")]
    Conflict {
        message: String,
        detail: Option<serde_json::Value>,
    },

    #[error("dependency unavailable: {message}")]
    DependencyUnavailable {
        message: String,
        detail: Option<serde_json::Value>,
    },

    #[error("timeout: {message}")]
    Timeout {
        message: String,
        detail: Option<serde_json::Value>,
    },

    #[error("transient: {message}")]
    Transient {
        message: String,
        detail: Option<serde_json::Value>,
    },

    #[error("fatal: {message}")]
    Fatal {
        message: String,
        detail: Option<serde_json::Value>,
    },
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation {
            message: message.into(),
            detail: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        EngineError::NotFound {
            message: message.into(),
            detail: None,
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        EngineError::Conflict {
            message: message.into(),
            detail: None,
        }
    }

    pub fn dependency_unavailable(message: impl Into<String>) -> Self {
        EngineError::DependencyUnavailable {
            message: message.into(),
            detail: None,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        EngineError::Fatal {
            message: message.into(),
            detail: None,
        }
    }

    /// Short machine-readable code, used by external callers' `error.code`.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation { .. } => "validation",
            EngineError::NotFound { .. } => "not_found",
            EngineError::Conflict { .. } => "conflict",
            EngineError::DependencyUnavailable { .. } => "dependency_unavailable",
            EngineError::Timeout { .. } => "timeout",
            EngineError::Transient { .. } => "transient",
            EngineError::Fatal { .. } => "fatal",
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                EngineError::Transient {
                    message: err.to_string(),
                    detail: None,
                }
            }
            rusqlite::Error::QueryReturnedNoRows => EngineError::NotFound {
                message: "row not found".to_string(),
                detail: None,
            },
            _ => EngineError::Fatal {
                message: err.to_string(),
                detail: None,
            },
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Fatal {
            message: err.to_string(),
            detail: None,
        }
    }
}
