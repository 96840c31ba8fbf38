//! Staff roles and the workflow permission table
//!
//! Workflow permissions are looked up per `(entity, action)` in a static table.
//! The ordinal rank is only consulted by the coarse user-management helpers,
//! because some capabilities are orthogonal to rank: a Manager may request a
//! client status change that only an Owner may apply.

use std::{
    fmt::{self, Display},
    str::FromStr
};

use serde::{Deserialize, Serialize};

use crate::domain::{error::WorkflowError, status::EntityKind};

/// Staff role, ordered `Owner > Manager > Admin`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Owner,
    Manager,
    Admin
}

impl Role {
    pub const ALL: &'static [Role] = &[Role::Owner, Role::Manager, Role::Admin];

    pub fn rank(&self) -> u8 {
        match self {
            Role::Owner => 3,
            Role::Manager => 2,
            Role::Admin => 1
        }
    }

    pub fn has_role_or_higher(&self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "OWNER",
            Role::Manager => "MANAGER",
            Role::Admin => "ADMIN"
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .copied()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| WorkflowError::Validation(format!("Unknown role: {}", s)))
    }
}

/// Owner manages anyone, Manager manages everyone but Owners, Admin manages nobody.
pub fn can_manage_users(actor: Role, target: Role) -> bool {
    match actor {
        Role::Owner => true,
        Role::Manager => target != Role::Owner,
        Role::Admin => false
    }
}

pub fn can_approve_registrations(role: Role) -> bool {
    role.has_role_or_higher(Role::Manager)
}

pub fn can_suspend_users(role: Role) -> bool {
    role == Role::Owner
}

/// Authenticated caller, resolved by the auth layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id:   String,
    pub role: Role
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    /// Turn an optional auth-layer resolution into an actor
    pub fn require(actor: Option<Actor>) -> Result<Actor, WorkflowError> {
        actor.ok_or(WorkflowError::Unauthenticated)
    }

    pub fn ensure(&self, entity: EntityKind, action: Action) -> Result<(), WorkflowError> {
        if permits(self.role, entity, action) {
            Ok(())
        } else {
            Err(WorkflowError::Forbidden { role: self.role, entity, action })
        }
    }
}

/// Workflow operation subject to authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    /// Change status immediately
    ApplyStatus,
    /// Propose a status change for review
    RequestStatus,
    /// Approve or reject a pending request
    ReviewRequest,
    Archive,
    Assign,
    Comment,
    /// Edit names, contact data and other non-status fields. No command here
    /// performs such edits; the rows record the policy for the CRUD layer.
    EditCoreFields,
    Delete
}

impl Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self {
            Action::Create => "create",
            Action::ApplyStatus => "apply status",
            Action::RequestStatus => "request status change",
            Action::ReviewRequest => "review status request",
            Action::Archive => "archive",
            Action::Assign => "assign",
            Action::Comment => "comment",
            Action::EditCoreFields => "edit core fields",
            Action::Delete => "delete"
        };
        f.write_str(action)
    }
}

const OWNER_ONLY: &[Role] = &[Role::Owner];
const MANAGER_ONLY: &[Role] = &[Role::Manager];
const OWNER_OR_MANAGER: &[Role] = &[Role::Owner, Role::Manager];
const ANY_STAFF: &[Role] = &[Role::Owner, Role::Manager, Role::Admin];

/// Roles granted each `(entity, action)`; absent entries deny.
pub const PERMISSIONS: &[(EntityKind, Action, &[Role])] = &[
    (EntityKind::Client, Action::Create, OWNER_OR_MANAGER),
    (EntityKind::Client, Action::ApplyStatus, OWNER_ONLY),
    (EntityKind::Client, Action::RequestStatus, MANAGER_ONLY),
    (EntityKind::Client, Action::ReviewRequest, OWNER_ONLY),
    (EntityKind::Client, Action::Archive, OWNER_ONLY),
    (EntityKind::Client, Action::Assign, OWNER_OR_MANAGER),
    (EntityKind::Client, Action::Comment, ANY_STAFF),
    (EntityKind::Client, Action::EditCoreFields, OWNER_OR_MANAGER),
    (EntityKind::Candidate, Action::Create, OWNER_OR_MANAGER),
    (EntityKind::Candidate, Action::ApplyStatus, ANY_STAFF),
    (EntityKind::Candidate, Action::Assign, OWNER_OR_MANAGER),
    (EntityKind::Candidate, Action::Comment, ANY_STAFF),
    (EntityKind::Candidate, Action::EditCoreFields, OWNER_OR_MANAGER),
    (EntityKind::Candidate, Action::Delete, OWNER_OR_MANAGER)
];

pub fn permits(role: Role, entity: EntityKind, action: Action) -> bool {
    PERMISSIONS
        .iter()
        .find(|(e, a, _)| *e == entity && *a == action)
        .is_some_and(|(_, _, roles)| roles.contains(&role))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_status_permissions_are_not_monotonic() {
        assert!(permits(Role::Owner, EntityKind::Client, Action::ApplyStatus));
        assert!(!permits(Role::Manager, EntityKind::Client, Action::ApplyStatus));
        assert!(!permits(Role::Admin, EntityKind::Client, Action::ApplyStatus));

        assert!(permits(Role::Manager, EntityKind::Client, Action::RequestStatus));
        assert!(!permits(Role::Owner, EntityKind::Client, Action::RequestStatus));
        assert!(!permits(Role::Admin, EntityKind::Client, Action::RequestStatus));

        assert!(permits(Role::Owner, EntityKind::Client, Action::ReviewRequest));
        assert!(!permits(Role::Manager, EntityKind::Client, Action::ReviewRequest));
    }

    #[test]
    fn admin_never_touches_client_status() {
        for action in [Action::ApplyStatus, Action::RequestStatus, Action::ReviewRequest, Action::Archive] {
            assert!(!permits(Role::Admin, EntityKind::Client, action), "admin allowed to {action}");
        }
    }

    #[test]
    fn any_staff_role_updates_candidate_status() {
        for role in Role::ALL {
            assert!(permits(*role, EntityKind::Candidate, Action::ApplyStatus));
        }
        assert!(!permits(Role::Admin, EntityKind::Candidate, Action::Delete));
        assert!(!permits(Role::Admin, EntityKind::Candidate, Action::Assign));
        assert!(permits(Role::Manager, EntityKind::Candidate, Action::Delete));
    }

    #[test]
    fn core_field_edits_need_owner_or_manager() {
        for entity in [EntityKind::Client, EntityKind::Candidate] {
            assert!(permits(Role::Owner, entity, Action::EditCoreFields));
            assert!(permits(Role::Manager, entity, Action::EditCoreFields));
            assert!(!permits(Role::Admin, entity, Action::EditCoreFields));
        }
    }

    #[test]
    fn unlisted_pairs_deny() {
        assert!(!permits(Role::Owner, EntityKind::Candidate, Action::RequestStatus));
        assert!(!permits(Role::Owner, EntityKind::Candidate, Action::Archive));
        assert!(!permits(Role::Owner, EntityKind::Client, Action::Delete));
    }

    #[test]
    fn forbidden_error_names_role_and_action() {
        let actor = Actor::new("u-1", Role::Manager);
        let err = actor.ensure(EntityKind::Client, Action::ApplyStatus).unwrap_err();
        assert_eq!(
            err,
            WorkflowError::Forbidden { role: Role::Manager, entity: EntityKind::Client, action: Action::ApplyStatus }
        );
    }

    #[test]
    fn rank_helpers() {
        assert!(Role::Owner.has_role_or_higher(Role::Manager));
        assert!(Role::Manager.has_role_or_higher(Role::Manager));
        assert!(!Role::Admin.has_role_or_higher(Role::Manager));

        assert!(can_manage_users(Role::Owner, Role::Owner));
        assert!(can_manage_users(Role::Manager, Role::Admin));
        assert!(!can_manage_users(Role::Manager, Role::Owner));
        assert!(!can_manage_users(Role::Admin, Role::Admin));

        assert!(can_approve_registrations(Role::Manager));
        assert!(!can_approve_registrations(Role::Admin));
        assert!(can_suspend_users(Role::Owner));
        assert!(!can_suspend_users(Role::Manager));
    }

    #[test]
    fn missing_actor_is_unauthenticated() {
        assert_eq!(Actor::require(None).unwrap_err(), WorkflowError::Unauthenticated);
    }
}
