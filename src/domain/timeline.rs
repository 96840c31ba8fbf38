//! Client timeline: plain comments, status changes and the comments threaded
//! onto each status change, merged into one chronological sequence.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    record::{ClientComment, ClientStatusHistory, StatusComment, UserSummary},
    status::ClientStatus
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineEntry {
    Comment {
        content: String
    },
    StatusChange {
        from_status: ClientStatus,
        to_status:   ClientStatus,
        comment:     Option<String>
    },
    StatusComment {
        status_history_id: String,
        content:           String
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineItem {
    pub id:         String,
    pub created_at: DateTime<Utc>,
    pub created_by: UserSummary,
    #[serde(flatten)]
    pub entry:      TimelineEntry
}

impl TimelineItem {
    pub fn kind(&self) -> &'static str {
        match self.entry {
            TimelineEntry::Comment { .. } => "comment",
            TimelineEntry::StatusChange { .. } => "status_change",
            TimelineEntry::StatusComment { .. } => "status_comment"
        }
    }
}

/// Merge the three record kinds ascending by creation time.
///
/// Items are laid out as comments first, then each history row followed by its
/// own comments; the sort is stable so equal timestamps keep that order.
/// Authors missing from `users` are rendered as unknown.
pub fn assemble_timeline(
    comments: &[ClientComment],
    history: &[ClientStatusHistory],
    status_comments: &[StatusComment],
    users: &HashMap<String, UserSummary>
) -> Vec<TimelineItem> {
    let author = |id: &str| users.get(id).cloned().unwrap_or_else(|| UserSummary::unknown(id));

    let mut items: Vec<TimelineItem> = comments
        .iter()
        .map(|c| TimelineItem {
            id:         c.id.clone(),
            created_at: c.created_at,
            created_by: author(&c.created_by),
            entry:      TimelineEntry::Comment { content: c.content.clone() }
        })
        .collect();

    for row in history {
        items.push(TimelineItem {
            id:         row.id.clone(),
            created_at: row.changed_at,
            created_by: author(&row.changed_by),
            entry:      TimelineEntry::StatusChange {
                from_status: row.from_status,
                to_status:   row.to_status,
                comment:     row.comment.clone()
            }
        });

        items.extend(status_comments.iter().filter(|sc| sc.history_id == row.id).map(|sc| TimelineItem {
            id:         sc.id.clone(),
            created_at: sc.created_at,
            created_by: author(&sc.created_by),
            entry:      TimelineEntry::StatusComment {
                status_history_id: row.id.clone(),
                content:           sc.content.clone()
            }
        }));
    }

    items.sort_by_key(|item| item.created_at);
    items
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::domain::record::new_id;

    fn at(base: DateTime<Utc>, secs: i64) -> DateTime<Utc> {
        base + Duration::seconds(secs)
    }

    fn comment(client_id: &str, content: &str, by: &str, created_at: DateTime<Utc>) -> ClientComment {
        ClientComment {
            id: new_id(),
            client_id: client_id.to_string(),
            content: content.to_string(),
            created_by: by.to_string(),
            created_at
        }
    }

    fn status_comment(row: &ClientStatusHistory, content: &str, created_at: DateTime<Utc>) -> StatusComment {
        StatusComment {
            id: new_id(),
            history_id: row.id.clone(),
            client_id: row.entity_id.clone(),
            content: content.to_string(),
            created_by: "owner".to_string(),
            created_at
        }
    }

    #[test]
    fn merges_all_kinds_chronologically() {
        let base = Utc::now();
        let created = ClientStatusHistory::creation("c-1", ClientStatus::Prospect, "Client created", "owner", base);
        let activated = ClientStatusHistory::new(
            "c-1",
            ClientStatus::Prospect,
            ClientStatus::Active,
            Some("signed".into()),
            "owner",
            at(base, 20)
        );
        let comments = vec![comment("c-1", "first call", "manager", at(base, 10)), comment("c-1", "follow up", "manager", at(base, 40))];
        let threaded = vec![status_comment(&activated, "congrats", at(base, 30))];
        let mut users = HashMap::new();
        users.insert(
            "owner".to_string(),
            UserSummary { id: "owner".into(), name: "Olive Owner".into(), email: Some("olive@example.com".into()) }
        );

        let timeline = assemble_timeline(&comments, &[created, activated.clone()], &threaded, &users);

        let kinds: Vec<_> = timeline.iter().map(TimelineItem::kind).collect();
        assert_eq!(kinds, vec!["status_change", "comment", "status_change", "status_comment", "comment"]);
        assert!(timeline.windows(2).all(|w| w[0].created_at <= w[1].created_at));

        assert_eq!(timeline[2].created_by.name, "Olive Owner");
        assert_eq!(timeline[1].created_by, UserSummary::unknown("manager"));
        match &timeline[3].entry {
            TimelineEntry::StatusComment { status_history_id, content } => {
                assert_eq!(status_history_id, &activated.id);
                assert_eq!(content, "congrats");
            }
            other => panic!("Expected status comment, got {:?}", other)
        }
    }

    #[test]
    fn equal_timestamps_keep_insertion_order() {
        let base = Utc::now();
        let row = ClientStatusHistory::creation("c-1", ClientStatus::Prospect, "Client created", "owner", base);
        let comments = vec![comment("c-1", "same instant", "owner", base)];
        let threaded = vec![status_comment(&row, "also same instant", base)];

        let timeline = assemble_timeline(&comments, &[row], &threaded, &HashMap::new());
        let kinds: Vec<_> = timeline.iter().map(TimelineItem::kind).collect();
        assert_eq!(kinds, vec!["comment", "status_change", "status_comment"]);
    }

    #[test]
    fn serialized_items_are_tagged() {
        let row = ClientStatusHistory::creation("c-1", ClientStatus::Prospect, "Client created", "owner", Utc::now());
        let timeline = assemble_timeline(&[], &[row], &[], &HashMap::new());
        let json = serde_json::to_value(&timeline[0]).unwrap();
        assert_eq!(json["type"], "status_change");
        assert_eq!(json["from_status"], "PROSPECT");
    }
}
