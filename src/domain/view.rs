//! Read projections and their table renderings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::domain::{
    record::{
        CandidateNote, CandidateStatusHistory, ClientStatusHistory, RequestState, StatusChangeRequest, UserProfile,
        UserSummary
    },
    status::ClientStatus,
    timeline::{TimelineEntry, TimelineItem}
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSummary {
    pub id:     String,
    pub name:   String,
    pub status: ClientStatus
}

/// Approval queue entry: a pending request joined with requester and client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub request:      StatusChangeRequest,
    pub requested_by: UserSummary,
    pub client:       ClientSummary
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

#[derive(Debug, Clone, Tabled)]
pub struct PendingApprovalRow {
    #[tabled(rename = "Request")]
    pub request_id:   String,
    #[tabled(rename = "Client")]
    pub client:       String,
    #[tabled(rename = "Transition")]
    pub transition:   String,
    #[tabled(rename = "Requested By")]
    pub requested_by: String,
    #[tabled(rename = "Requested At")]
    pub requested_at: String,
    #[tabled(rename = "Comment")]
    pub comment:      String
}

impl From<&PendingApproval> for PendingApprovalRow {
    fn from(entry: &PendingApproval) -> Self {
        Self {
            request_id:   entry.request.id.clone(),
            client:       entry.client.name.clone(),
            transition:   format!("{} -> {}", entry.request.from_status, entry.request.to_status),
            requested_by: entry.requested_by.name.clone(),
            requested_at: format_timestamp(&entry.request.requested_at),
            comment:      entry.request.comment.clone().unwrap_or_default()
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct HistoryRow {
    #[tabled(rename = "Entry")]
    pub id:         String,
    #[tabled(rename = "From")]
    pub from:       String,
    #[tabled(rename = "To")]
    pub to:         String,
    #[tabled(rename = "Changed By")]
    pub changed_by: String,
    #[tabled(rename = "Changed At")]
    pub changed_at: String,
    #[tabled(rename = "Comment")]
    pub comment:    String
}

impl From<&ClientStatusHistory> for HistoryRow {
    fn from(row: &ClientStatusHistory) -> Self {
        Self {
            id:         row.id.clone(),
            from:       row.from_status.to_string(),
            to:         row.to_status.to_string(),
            changed_by: row.changed_by.clone(),
            changed_at: format_timestamp(&row.changed_at),
            comment:    row.comment.clone().unwrap_or_default()
        }
    }
}

impl From<&CandidateStatusHistory> for HistoryRow {
    fn from(row: &CandidateStatusHistory) -> Self {
        Self {
            id:         row.id.clone(),
            from:       row.from_status.to_string(),
            to:         row.to_status.to_string(),
            changed_by: row.changed_by.clone(),
            changed_at: format_timestamp(&row.changed_at),
            comment:    row.comment.clone().unwrap_or_default()
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct TimelineRow {
    #[tabled(rename = "At")]
    pub at:     String,
    #[tabled(rename = "Kind")]
    pub kind:   String,
    #[tabled(rename = "Author")]
    pub author: String,
    #[tabled(rename = "Details")]
    pub detail: String
}

impl From<&TimelineItem> for TimelineRow {
    fn from(item: &TimelineItem) -> Self {
        let detail = match &item.entry {
            TimelineEntry::Comment { content } => content.clone(),
            TimelineEntry::StatusChange { from_status, to_status, comment } => match comment {
                Some(comment) => format!("{} -> {}: {}", from_status, to_status, comment),
                None => format!("{} -> {}", from_status, to_status)
            },
            TimelineEntry::StatusComment { status_history_id, content } => {
                format!("re {}: {}", status_history_id, content)
            }
        };
        Self {
            at: format_timestamp(&item.created_at),
            kind: item.kind().to_string(),
            author: item.created_by.name.clone(),
            detail
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct RequestRow {
    #[tabled(rename = "Request")]
    pub id:           String,
    #[tabled(rename = "Transition")]
    pub transition:   String,
    #[tabled(rename = "Status")]
    pub status:       String,
    #[tabled(rename = "Requested By")]
    pub requested_by: String,
    #[tabled(rename = "Reviewed By")]
    pub reviewed_by:  String,
    #[tabled(rename = "Requested At")]
    pub requested_at: String
}

impl From<&StatusChangeRequest> for RequestRow {
    fn from(request: &StatusChangeRequest) -> Self {
        let reviewed_by = match &request.state {
            RequestState::Pending => String::new(),
            RequestState::Approved { reviewed_by, .. } | RequestState::Rejected { reviewed_by, .. } => {
                reviewed_by.clone()
            }
        };
        Self {
            id: request.id.clone(),
            transition: format!("{} -> {}", request.from_status, request.to_status),
            status: request.status().to_string(),
            requested_by: request.requested_by.clone(),
            reviewed_by,
            requested_at: format_timestamp(&request.requested_at)
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct UserRow {
    #[tabled(rename = "User")]
    pub id:     String,
    #[tabled(rename = "Name")]
    pub name:   String,
    #[tabled(rename = "Email")]
    pub email:  String,
    #[tabled(rename = "Role")]
    pub role:   String,
    #[tabled(rename = "Status")]
    pub status: String
}

impl From<&UserProfile> for UserRow {
    fn from(user: &UserProfile) -> Self {
        Self {
            id:     user.id.clone(),
            name:   user.name.clone(),
            email:  user.email.clone(),
            role:   user.role.to_string(),
            status: user.status.to_string()
        }
    }
}

#[derive(Debug, Clone, Tabled)]
pub struct NoteRow {
    #[tabled(rename = "At")]
    pub at:      String,
    #[tabled(rename = "Author")]
    pub author:  String,
    #[tabled(rename = "Note")]
    pub content: String
}

impl From<&CandidateNote> for NoteRow {
    fn from(note: &CandidateNote) -> Self {
        Self { at: format_timestamp(&note.created_at), author: note.created_by.clone(), content: note.content.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_row_shows_transition() {
        let request = StatusChangeRequest::pending(
            "c-1",
            ClientStatus::Active,
            ClientStatus::Inactive,
            Some("renewal lapsed".into()),
            "m-1",
            Utc::now()
        );
        let entry = PendingApproval {
            request,
            requested_by: UserSummary::unknown("m-1"),
            client: ClientSummary { id: "c-1".into(), name: "Acme".into(), status: ClientStatus::Active }
        };
        let row = PendingApprovalRow::from(&entry);
        assert_eq!(row.transition, "ACTIVE -> INACTIVE");
        assert_eq!(row.client, "Acme");
        assert_eq!(row.comment, "renewal lapsed");
    }

    #[test]
    fn request_row_shows_reviewer_once_resolved() {
        let request =
            StatusChangeRequest::pending("c-1", ClientStatus::Active, ClientStatus::Archived, None, "m-1", Utc::now());
        assert_eq!(RequestRow::from(&request).reviewed_by, "");

        let rejected = request.reject("o-1", Utc::now(), None).unwrap();
        let row = RequestRow::from(&rejected);
        assert_eq!(row.status, "REJECTED");
        assert_eq!(row.reviewed_by, "o-1");
    }
}
