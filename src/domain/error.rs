use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{
    record::RequestStatus,
    role::{Action, Role},
    status::EntityKind
};

/// Error type for every engine operation
///
/// Validation failures are raised before any write; the storage variants
/// cover infrastructure faults that surface as internal errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// No actor could be resolved for the call
    #[error("Authentication required")]
    Unauthenticated,

    /// The actor's role does not grant the action
    #[error("Role {role} may not {action} on a {entity}")]
    Forbidden { role: Role, entity: EntityKind, action: Action },

    /// The actor's role may not manage users of the target role
    #[error("Role {role} may not manage {target} users")]
    UserManagementDenied { role: Role, target: Role },

    /// The actor's role may not change account status
    #[error("Role {role} may not {action} user accounts")]
    AccountActionDenied { role: Role, action: &'static str },

    /// Referenced record does not exist
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// Child record exists but belongs to another parent
    #[error("{resource} {id} does not belong to {parent_id}")]
    Mismatch { resource: &'static str, id: String, parent_id: String },

    /// Target status equals the current one
    #[error("Status is already set to {status}")]
    NoOp { status: String },

    /// Target not reachable from the current status
    #[error("Invalid status transition from {from} to {to} (allowed: [{}])", .allowed.join(", "))]
    InvalidTransition { entity: EntityKind, from: String, to: String, allowed: Vec<String> },

    /// Status value outside the entity's status set
    #[error("Unknown {entity} status: {value}")]
    UnknownStatus { entity: EntityKind, value: String },

    /// Critical transition attempted without a justification
    #[error("Comment is required for the {from} to {to} transition")]
    CommentRequired { from: String, to: String },

    /// Request has already been approved or rejected
    #[error("Status change request {request_id} is already {status}")]
    AlreadyResolved { request_id: String, status: RequestStatus },

    /// Entity status moved between read and commit
    #[error("{entity} {id} changed concurrently: expected {expected}, found {actual}")]
    Conflict { entity: EntityKind, id: String, expected: String, actual: String },

    /// User account moved between read and commit
    #[error("User {user_id} changed concurrently")]
    UserConflict { user_id: String },

    /// Malformed input
    #[error("{0}")]
    Validation(String),

    /// Storage backend errors
    #[error("{0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("{0}")]
    Serialization(String),

    /// Configuration related errors
    #[error("{0}")]
    Configuration(String),

    /// File system related errors
    #[error("{0}")]
    FileSystem(String)
}

/// Flat classification used by callers to map errors onto responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Unauthenticated,
    Forbidden,
    NotFound,
    Mismatch,
    NoOp,
    InvalidTransition,
    CommentRequired,
    AlreadyResolved,
    Conflict,
    Validation,
    Internal
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            ErrorKind::Unauthenticated => "UNAUTHENTICATED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Mismatch => "MISMATCH",
            ErrorKind::NoOp => "NO_OP",
            ErrorKind::InvalidTransition => "INVALID_TRANSITION",
            ErrorKind::CommentRequired => "COMMENT_REQUIRED",
            ErrorKind::AlreadyResolved => "ALREADY_RESOLVED",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Internal => "INTERNAL"
        };
        f.write_str(kind)
    }
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::Unauthenticated => ErrorKind::Unauthenticated,
            WorkflowError::Forbidden { .. }
            | WorkflowError::UserManagementDenied { .. }
            | WorkflowError::AccountActionDenied { .. } => ErrorKind::Forbidden,
            WorkflowError::NotFound { .. } => ErrorKind::NotFound,
            WorkflowError::Mismatch { .. } => ErrorKind::Mismatch,
            WorkflowError::NoOp { .. } => ErrorKind::NoOp,
            WorkflowError::InvalidTransition { .. } | WorkflowError::UnknownStatus { .. } => {
                ErrorKind::InvalidTransition
            }
            WorkflowError::CommentRequired { .. } => ErrorKind::CommentRequired,
            WorkflowError::AlreadyResolved { .. } => ErrorKind::AlreadyResolved,
            WorkflowError::Conflict { .. } | WorkflowError::UserConflict { .. } => ErrorKind::Conflict,
            WorkflowError::Validation(_) => ErrorKind::Validation,
            WorkflowError::Storage(_)
            | WorkflowError::Serialization(_)
            | WorkflowError::Configuration(_)
            | WorkflowError::FileSystem(_) => ErrorKind::Internal
        }
    }

    /// Allowed targets carried by an invalid transition, if any
    pub fn allowed_targets(&self) -> Option<&[String]> {
        match self {
            WorkflowError::InvalidTransition { allowed, .. } => Some(allowed),
            _ => None
        }
    }

    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        WorkflowError::NotFound { resource, id: id.into() }
    }
}

/// Convert from anyhow::Error
impl From<anyhow::Error> for WorkflowError {
    fn from(err: anyhow::Error) -> Self {
        WorkflowError::Configuration(format!("{:#}", err))
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for WorkflowError {
    fn from(err: std::io::Error) -> Self {
        WorkflowError::FileSystem(err.to_string())
    }
}

/// Convert from serde_yaml::Error
impl From<serde_yaml::Error> for WorkflowError {
    fn from(err: serde_yaml::Error) -> Self {
        WorkflowError::Serialization(err.to_string())
    }
}

/// Convert from serde_json::Error
impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        WorkflowError::Serialization(err.to_string())
    }
}

/// Convert from rocksdb::Error
impl From<rocksdb::Error> for WorkflowError {
    fn from(err: rocksdb::Error) -> Self {
        WorkflowError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_reports_allowed_targets() {
        let err = WorkflowError::InvalidTransition {
            entity:  EntityKind::Candidate,
            from:    "APPLIED".to_string(),
            to:      "HIRED".to_string(),
            allowed: vec!["SCREENING".to_string(), "REJECTED".to_string()]
        };
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(err.allowed_targets().unwrap(), &["SCREENING".to_string(), "REJECTED".to_string()]);
        assert_eq!(err.to_string(), "Invalid status transition from APPLIED to HIRED (allowed: [SCREENING, REJECTED])");
    }

    #[test]
    fn infrastructure_errors_are_internal() {
        assert_eq!(WorkflowError::Storage("disk full".into()).kind(), ErrorKind::Internal);
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(WorkflowError::from(io).kind(), ErrorKind::Internal);
    }

    #[test]
    fn kinds_render_in_screaming_case() {
        assert_eq!(ErrorKind::AlreadyResolved.to_string(), "ALREADY_RESOLVED");
        assert_eq!(WorkflowError::NoOp { status: "OFFER".into() }.kind().to_string(), "NO_OP");
    }
}
