//! Lifecycle statuses and the transition table
//!
//! Both entity kinds share the [`StatusGraph`] contract: a static, immutable
//! adjacency list per status. Nothing here is mutable at runtime.

use std::{
    fmt::{self, Display},
    str::FromStr
};

use serde::{Deserialize, Serialize};

use crate::domain::error::WorkflowError;

/// Kind of entity whose status is tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Client,
    Candidate
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Client => write!(f, "client"),
            EntityKind::Candidate => write!(f, "candidate")
        }
    }
}

/// A status enum backed by a static transition graph
pub trait StatusGraph: Copy + Eq + Display + Send + Sync + 'static {
    /// Entity kind this graph belongs to
    const ENTITY: EntityKind;

    /// Every status of the graph, in declaration order
    const ALL: &'static [Self];

    /// Statuses reachable from `self` in one step
    fn valid_targets(self) -> &'static [Self];

    /// Whether `(self, to)` requires a non-empty justification comment
    fn requires_comment(self, _to: Self) -> bool {
        false
    }

    /// Self-loops are never listed, so `from == to` is always invalid.
    fn is_valid_transition(self, to: Self) -> bool {
        self.valid_targets().contains(&to)
    }

    fn is_terminal(self) -> bool {
        self.valid_targets().is_empty()
    }

    /// Allowed targets rendered for error payloads
    fn target_names(self) -> Vec<String> {
        self.valid_targets().iter().map(ToString::to_string).collect()
    }
}

// **********************
// Client
// **********************

/// Client lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientStatus {
    Prospect,
    Active,
    Inactive,
    Archived
}

const CLIENT_FROM_PROSPECT: &[ClientStatus] = &[ClientStatus::Active, ClientStatus::Archived];
const CLIENT_FROM_ACTIVE: &[ClientStatus] = &[ClientStatus::Inactive, ClientStatus::Archived];
const CLIENT_FROM_INACTIVE: &[ClientStatus] = &[ClientStatus::Active, ClientStatus::Archived];

/// Client transitions that need a justification on every path
pub const CRITICAL_CLIENT_TRANSITIONS: &[(ClientStatus, ClientStatus)] = &[
    (ClientStatus::Prospect, ClientStatus::Active),
    (ClientStatus::Active, ClientStatus::Inactive),
    (ClientStatus::Active, ClientStatus::Archived)
];

impl StatusGraph for ClientStatus {
    const ALL: &'static [Self] =
        &[ClientStatus::Prospect, ClientStatus::Active, ClientStatus::Inactive, ClientStatus::Archived];
    const ENTITY: EntityKind = EntityKind::Client;

    fn valid_targets(self) -> &'static [Self] {
        match self {
            ClientStatus::Prospect => CLIENT_FROM_PROSPECT,
            ClientStatus::Active => CLIENT_FROM_ACTIVE,
            ClientStatus::Inactive => CLIENT_FROM_INACTIVE,
            ClientStatus::Archived => &[]
        }
    }

    fn requires_comment(self, to: Self) -> bool {
        CRITICAL_CLIENT_TRANSITIONS.contains(&(self, to))
    }
}

impl ClientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientStatus::Prospect => "PROSPECT",
            ClientStatus::Active => "ACTIVE",
            ClientStatus::Inactive => "INACTIVE",
            ClientStatus::Archived => "ARCHIVED"
        }
    }
}

impl Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClientStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| WorkflowError::UnknownStatus { entity: EntityKind::Client, value: s.to_string() })
    }
}

// **********************
// Candidate
// **********************

/// Candidate pipeline status. Strictly forward, no re-entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CandidateStatus {
    Applied,
    Screening,
    Interview,
    Offer,
    Hired,
    Rejected
}

const CANDIDATE_FROM_APPLIED: &[CandidateStatus] = &[CandidateStatus::Screening, CandidateStatus::Rejected];
const CANDIDATE_FROM_SCREENING: &[CandidateStatus] = &[CandidateStatus::Interview, CandidateStatus::Rejected];
const CANDIDATE_FROM_INTERVIEW: &[CandidateStatus] = &[CandidateStatus::Offer, CandidateStatus::Rejected];
const CANDIDATE_FROM_OFFER: &[CandidateStatus] = &[CandidateStatus::Hired, CandidateStatus::Rejected];

impl StatusGraph for CandidateStatus {
    const ALL: &'static [Self] = &[
        CandidateStatus::Applied,
        CandidateStatus::Screening,
        CandidateStatus::Interview,
        CandidateStatus::Offer,
        CandidateStatus::Hired,
        CandidateStatus::Rejected
    ];
    const ENTITY: EntityKind = EntityKind::Candidate;

    fn valid_targets(self) -> &'static [Self] {
        match self {
            CandidateStatus::Applied => CANDIDATE_FROM_APPLIED,
            CandidateStatus::Screening => CANDIDATE_FROM_SCREENING,
            CandidateStatus::Interview => CANDIDATE_FROM_INTERVIEW,
            CandidateStatus::Offer => CANDIDATE_FROM_OFFER,
            CandidateStatus::Hired | CandidateStatus::Rejected => &[]
        }
    }
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Applied => "APPLIED",
            CandidateStatus::Screening => "SCREENING",
            CandidateStatus::Interview => "INTERVIEW",
            CandidateStatus::Offer => "OFFER",
            CandidateStatus::Hired => "HIRED",
            CandidateStatus::Rejected => "REJECTED"
        }
    }
}

impl Display for CandidateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandidateStatus {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CandidateStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| WorkflowError::UnknownStatus { entity: EntityKind::Candidate, value: s.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected_client_edges() -> Vec<(ClientStatus, ClientStatus)> {
        use ClientStatus::*;
        vec![
            (Prospect, Active),
            (Prospect, Archived),
            (Active, Inactive),
            (Active, Archived),
            (Inactive, Active),
            (Inactive, Archived),
        ]
    }

    fn expected_candidate_edges() -> Vec<(CandidateStatus, CandidateStatus)> {
        use CandidateStatus::*;
        vec![
            (Applied, Screening),
            (Applied, Rejected),
            (Screening, Interview),
            (Screening, Rejected),
            (Interview, Offer),
            (Interview, Rejected),
            (Offer, Hired),
            (Offer, Rejected),
        ]
    }

    #[test]
    fn client_transition_closure_is_exact() {
        let edges = expected_client_edges();
        for &from in ClientStatus::ALL {
            for &to in ClientStatus::ALL {
                assert_eq!(
                    from.is_valid_transition(to),
                    edges.contains(&(from, to)),
                    "unexpected verdict for {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn candidate_transition_closure_is_exact() {
        let edges = expected_candidate_edges();
        for &from in CandidateStatus::ALL {
            for &to in CandidateStatus::ALL {
                assert_eq!(
                    from.is_valid_transition(to),
                    edges.contains(&(from, to)),
                    "unexpected verdict for {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn self_loops_are_never_valid() {
        assert!(ClientStatus::ALL.iter().all(|s| !s.is_valid_transition(*s)));
        assert!(CandidateStatus::ALL.iter().all(|s| !s.is_valid_transition(*s)));
    }

    #[test]
    fn terminal_states_have_no_targets() {
        let terminal_clients: Vec<_> = ClientStatus::ALL.iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal_clients, vec![&ClientStatus::Archived]);

        let terminal_candidates: Vec<_> = CandidateStatus::ALL.iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal_candidates, vec![&CandidateStatus::Hired, &CandidateStatus::Rejected]);
    }

    #[test]
    fn critical_subset_only_applies_to_clients() {
        use ClientStatus::*;
        assert!(Prospect.requires_comment(Active));
        assert!(Active.requires_comment(Inactive));
        assert!(Active.requires_comment(Archived));
        assert!(!Prospect.requires_comment(Archived));
        assert!(!Inactive.requires_comment(Active));
        assert!(!Inactive.requires_comment(Archived));

        for &from in CandidateStatus::ALL {
            for &to in CandidateStatus::ALL {
                assert!(!from.requires_comment(to));
            }
        }
    }

    #[test]
    fn critical_transitions_are_all_legal_edges() {
        for (from, to) in CRITICAL_CLIENT_TRANSITIONS {
            assert!(from.is_valid_transition(*to));
        }
    }

    #[test]
    fn parse_and_display_agree() {
        for status in ClientStatus::ALL {
            assert_eq!(status.to_string().parse::<ClientStatus>().unwrap(), *status);
        }
        for status in CandidateStatus::ALL {
            assert_eq!(status.to_string().parse::<CandidateStatus>().unwrap(), *status);
        }
        assert_eq!("screening".parse::<CandidateStatus>().unwrap(), CandidateStatus::Screening);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = "PAUSED".parse::<ClientStatus>().unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownStatus { entity: EntityKind::Client, .. }));
    }

    #[test]
    fn serde_uses_screaming_case() {
        assert_eq!(serde_json::to_string(&ClientStatus::Prospect).unwrap(), "\"PROSPECT\"");
        let status: CandidateStatus = serde_json::from_str("\"OFFER\"").unwrap();
        assert_eq!(status, CandidateStatus::Offer);
    }
}
