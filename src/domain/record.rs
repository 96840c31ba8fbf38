//! Persisted records: entities, audit rows and the status change request
//!
//! Audit rows (`StatusHistory`, comments, assignments) are append-only.
//! A `StatusChangeRequest` moves out of `Pending` exactly once; the only way to
//! resolve one is [`StatusChangeRequest::approve`] or
//! [`StatusChangeRequest::reject`], both of which refuse a resolved request.

use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    error::WorkflowError,
    role::Role,
    status::{CandidateStatus, ClientStatus}
};

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// **********************
// Entities
// **********************

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id:          String,
    pub name:        String,
    pub industry:    Option<String>,
    pub status:      ClientStatus,
    pub assigned_to: Option<String>,
    pub created_by:  String,
    pub updated_by:  String,
    pub created_at:  DateTime<Utc>,
    pub updated_at:  DateTime<Utc>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub id:          String,
    pub name:        String,
    pub email:       String,
    pub status:      CandidateStatus,
    pub assigned_to: Option<String>,
    pub created_by:  String,
    pub updated_by:  String,
    pub created_at:  DateTime<Utc>,
    pub updated_at:  DateTime<Utc>
}

/// Account lifecycle of a staff member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    /// Registered, waiting for an Owner or Manager
    Pending,
    Active,
    Suspended
}

impl Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserStatus::Pending => write!(f, "PENDING"),
            UserStatus::Active => write!(f, "ACTIVE"),
            UserStatus::Suspended => write!(f, "SUSPENDED")
        }
    }
}

/// Staff member as known to the directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id:     String,
    pub name:   String,
    pub email:  String,
    pub role:   Role,
    pub status: UserStatus
}

impl UserProfile {
    /// Only active accounts may act
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Directory key for an email; addresses are unique regardless of case
pub fn email_key(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Display identity joined onto projections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id:    String,
    pub name:  String,
    pub email: Option<String>
}

impl UserSummary {
    /// Placeholder for an actor id missing from the directory
    pub fn unknown(id: impl Into<String>) -> Self {
        Self { id: id.into(), name: "Unknown user".to_string(), email: None }
    }
}

impl From<&UserProfile> for UserSummary {
    fn from(user: &UserProfile) -> Self {
        Self { id: user.id.clone(), name: user.name.clone(), email: Some(user.email.clone()) }
    }
}

// **********************
// Audit records
// **********************

/// One row per successful status mutation, including the creation row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistory<S> {
    pub id:          String,
    pub entity_id:   String,
    pub from_status: S,
    pub to_status:   S,
    pub comment:     Option<String>,
    pub changed_by:  String,
    pub changed_at:  DateTime<Utc>
}

pub type ClientStatusHistory = StatusHistory<ClientStatus>;
pub type CandidateStatusHistory = StatusHistory<CandidateStatus>;

impl<S: Copy> StatusHistory<S> {
    pub fn new(
        entity_id: impl Into<String>,
        from_status: S,
        to_status: S,
        comment: Option<String>,
        changed_by: impl Into<String>,
        changed_at: DateTime<Utc>
    ) -> Self {
        Self {
            id: new_id(),
            entity_id: entity_id.into(),
            from_status,
            to_status,
            comment,
            changed_by: changed_by.into(),
            changed_at
        }
    }

    /// Origin row written when the entity is created
    pub fn creation(
        entity_id: impl Into<String>,
        initial: S,
        comment: &str,
        changed_by: impl Into<String>,
        changed_at: DateTime<Utc>
    ) -> Self {
        Self::new(entity_id, initial, initial, Some(comment.to_string()), changed_by, changed_at)
    }
}

/// Free-form discussion threaded onto a client status history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusComment {
    pub id:         String,
    pub history_id: String,
    pub client_id:  String,
    pub content:    String,
    pub created_by: String,
    pub created_at: DateTime<Utc>
}

/// Plain comment on a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientComment {
    pub id:         String,
    pub client_id:  String,
    pub content:    String,
    pub created_by: String,
    pub created_at: DateTime<Utc>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateNote {
    pub id:           String,
    pub candidate_id: String,
    pub content:      String,
    pub created_by:   String,
    pub created_at:   DateTime<Utc>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub id:          String,
    pub entity_id:   String,
    pub assigned_to: String,
    pub assigned_by: String,
    pub assigned_at: DateTime<Utc>
}

impl AssignmentRecord {
    pub fn new(
        entity_id: impl Into<String>,
        assigned_to: impl Into<String>,
        assigned_by: impl Into<String>,
        assigned_at: DateTime<Utc>
    ) -> Self {
        Self {
            id: new_id(),
            entity_id: entity_id.into(),
            assigned_to: assigned_to.into(),
            assigned_by: assigned_by.into(),
            assigned_at
        }
    }
}

// **********************
// Status change request
// **********************

/// Disposition tag of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected
}

impl Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "PENDING"),
            RequestStatus::Approved => write!(f, "APPROVED"),
            RequestStatus::Rejected => write!(f, "REJECTED")
        }
    }
}

/// Review outcome, with the reviewer data only present once resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    Pending,
    Approved {
        reviewed_by: String,
        reviewed_at: DateTime<Utc>
    },
    Rejected {
        reviewed_by:    String,
        reviewed_at:    DateTime<Utc>,
        review_comment: Option<String>
    }
}

impl RequestState {
    pub fn status(&self) -> RequestStatus {
        match self {
            RequestState::Pending => RequestStatus::Pending,
            RequestState::Approved { .. } => RequestStatus::Approved,
            RequestState::Rejected { .. } => RequestStatus::Rejected
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, RequestState::Pending)
    }
}

/// Two-phase client status change: proposed by a Manager, disposed by an Owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangeRequest {
    pub id:           String,
    pub client_id:    String,
    pub from_status:  ClientStatus,
    pub to_status:    ClientStatus,
    pub comment:      Option<String>,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub state:        RequestState
}

impl StatusChangeRequest {
    pub fn pending(
        client_id: impl Into<String>,
        from_status: ClientStatus,
        to_status: ClientStatus,
        comment: Option<String>,
        requested_by: impl Into<String>,
        requested_at: DateTime<Utc>
    ) -> Self {
        Self {
            id: new_id(),
            client_id: client_id.into(),
            from_status,
            to_status,
            comment,
            requested_by: requested_by.into(),
            requested_at,
            state: RequestState::Pending
        }
    }

    pub fn status(&self) -> RequestStatus {
        self.state.status()
    }

    pub fn ensure_pending(&self) -> Result<(), WorkflowError> {
        if self.state.is_pending() {
            Ok(())
        } else {
            Err(WorkflowError::AlreadyResolved { request_id: self.id.clone(), status: self.status() })
        }
    }

    pub fn approve(&self, reviewed_by: impl Into<String>, reviewed_at: DateTime<Utc>) -> Result<Self, WorkflowError> {
        self.ensure_pending()?;
        Ok(Self { state: RequestState::Approved { reviewed_by: reviewed_by.into(), reviewed_at }, ..self.clone() })
    }

    pub fn reject(
        &self,
        reviewed_by: impl Into<String>,
        reviewed_at: DateTime<Utc>,
        review_comment: Option<String>
    ) -> Result<Self, WorkflowError> {
        self.ensure_pending()?;
        Ok(Self {
            state: RequestState::Rejected { reviewed_by: reviewed_by.into(), reviewed_at, review_comment },
            ..self.clone()
        })
    }
}

/// Blank input counts as absent; anything else is kept verbatim.
pub fn normalize_comment(comment: Option<String>) -> Option<String> {
    comment.filter(|text| !text.trim().is_empty())
}

/// Trimmed, non-empty content for comments and notes
pub fn require_content(content: &str, what: &str) -> Result<String, WorkflowError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        Err(WorkflowError::Validation(format!("{} content is required", what)))
    } else {
        Ok(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_request() -> StatusChangeRequest {
        StatusChangeRequest::pending(
            "client-1",
            ClientStatus::Active,
            ClientStatus::Inactive,
            Some("renewal lapsed".to_string()),
            "manager-1",
            Utc::now()
        )
    }

    #[test]
    fn request_resolves_once() {
        let request = pending_request();
        let approved = request.approve("owner-1", Utc::now()).unwrap();
        assert_eq!(approved.status(), RequestStatus::Approved);
        assert_eq!(approved.id, request.id);

        let err = approved.reject("owner-1", Utc::now(), None).unwrap_err();
        assert_eq!(err, WorkflowError::AlreadyResolved { request_id: request.id.clone(), status: RequestStatus::Approved });

        let err = approved.approve("owner-1", Utc::now()).unwrap_err();
        assert!(matches!(err, WorkflowError::AlreadyResolved { .. }));
    }

    #[test]
    fn rejection_keeps_review_comment() {
        let rejected = pending_request().reject("owner-1", Utc::now(), Some("keep active".to_string())).unwrap();
        match rejected.state {
            RequestState::Rejected { reviewed_by, review_comment, .. } => {
                assert_eq!(reviewed_by, "owner-1");
                assert_eq!(review_comment.as_deref(), Some("keep active"));
            }
            other => panic!("Expected rejected state, got {:?}", other)
        }
    }

    #[test]
    fn request_state_serializes_as_tagged_status() {
        let json = serde_json::to_value(pending_request()).unwrap();
        assert_eq!(json["state"]["status"], "PENDING");
    }

    #[test]
    fn creation_row_is_a_self_edge() {
        let row = ClientStatusHistory::creation("c-1", ClientStatus::Prospect, "Client created", "u-1", Utc::now());
        assert_eq!(row.from_status, row.to_status);
        assert_eq!(row.comment.as_deref(), Some("Client created"));
    }

    #[test]
    fn email_key_ignores_case_and_padding() {
        assert_eq!(email_key(" Casey@Example.COM "), "casey@example.com");
        assert_eq!(serde_json::to_value(UserStatus::Suspended).unwrap(), "SUSPENDED");
    }

    #[test]
    fn comment_normalization() {
        assert_eq!(normalize_comment(None), None);
        assert_eq!(normalize_comment(Some("   ".into())), None);
        assert_eq!(normalize_comment(Some(" why ".into())).as_deref(), Some(" why "));

        assert_eq!(require_content("  hello ", "Comment").unwrap(), "hello");
        assert!(matches!(require_content(" \n", "Comment"), Err(WorkflowError::Validation(_))));
    }
}
