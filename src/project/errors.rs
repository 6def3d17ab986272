// Error taxonomy for project creation

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::types::{Phase, PhaseStatus, Resource};

/// Caller-supplied configuration is unusable; raised before any backend is touched
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfigError {
    #[error("project name must not be empty")]
    EmptyName,

    #[error("project description must be a structured document (JSON object)")]
    InvalidDescription,

    #[error("invalid setting `{key}`: {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error("extension `{name}` is registered more than once")]
    DuplicateExtension { name: String },

    #[error("unsupported project type: {project_type}")]
    UnsupportedProjectType { project_type: String },
}

/// Whether retrying the same call later could succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    Permanent,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Transient => f.write_str("transient"),
            ErrorClass::Permanent => f.write_str("permanent"),
        }
    }
}

/// Failure reported by a resource client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("transient failure: {message}")]
    Transient { message: String },

    #[error("permanent failure: {message}")]
    Permanent { message: String },

    #[error("operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("resource does not match expected shape: {reason}")]
    Mismatch { reason: String },
}

impl ClientError {
    pub fn transient(message: impl Into<String>) -> Self {
        ClientError::Transient {
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        ClientError::Permanent {
            message: message.into(),
        }
    }

    pub fn mismatch(reason: impl Into<String>) -> Self {
        ClientError::Mismatch {
            reason: reason.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ClientError::Transient { .. } | ClientError::Timeout { .. } => ErrorClass::Transient,
            ClientError::Permanent { .. } | ClientError::Mismatch { .. } => ErrorClass::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Failure reported by an extension
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtensionError {
    #[error("execution failed: {message}")]
    Execution { message: String },

    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error(transparent)]
    Client(#[from] ClientError),
}

impl ExtensionError {
    pub fn execution(message: impl Into<String>) -> Self {
        ExtensionError::Execution {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ExtensionError::Validation {
            message: message.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ExtensionError::Client(e) => e.class(),
            _ => ErrorClass::Permanent,
        }
    }
}

/// Classified failure recorded in the project state
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProjectError {
    #[error("{resource} creation failed ({class}): {message}")]
    ResourceCreate {
        resource: Resource,
        class: ErrorClass,
        message: String,
    },

    #[error("{resource} validation failed: {message}")]
    ResourceValidate { resource: Resource, message: String },

    #[error("{resource} cleanup failed: {message}")]
    Cleanup { resource: Resource, message: String },

    #[error("project creation cancelled during {phase} phase")]
    Cancelled { phase: Phase },
}

impl ProjectError {
    pub fn is_cleanup(&self) -> bool {
        matches!(self, ProjectError::Cleanup { .. })
    }
}

/// Illegal move rejected by the project state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("phase {phase} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        phase: Phase,
        from: PhaseStatus,
        to: PhaseStatus,
    },

    #[error("phase {phase} cannot start after {failed} failed")]
    AfterFailure { phase: Phase, failed: Phase },

    #[error("overall status already set")]
    AlreadyFinished,
}
