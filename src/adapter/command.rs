use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    domain::{
        command::{
            AddCandidateNoteCommand, AddClientCommentCommand, AddStatusCommentCommand, ApplyClientStatusCommand,
            ApproveStatusRequestCommand, ApproveUserCommand, ArchiveClientCommand, AssignCandidateCommand,
            AssignClientCommand, BootstrapOwnerCommand, CandidateAssignmentData, ChangeUserRoleCommand,
            ClientAssignmentData, CreateCandidateCommand, CreateClientCommand, CreateStatusRequestCommand,
            DeleteCandidateCommand, RegisterUserCommand, RejectStatusRequestCommand, ReviewData, StatusCommentData,
            SuspendUserCommand, UpdateCandidateStatusCommand
        },
        error::WorkflowError,
        record::{
            AssignmentRecord, Candidate, CandidateNote, CandidateStatusHistory, Client, ClientComment,
            ClientStatusHistory, StatusChangeRequest, StatusComment, UserProfile, UserStatus, email_key, new_id,
            normalize_comment, require_content
        },
        role::{Action, Actor, Role, can_approve_registrations, can_manage_users, can_suspend_users},
        status::{CandidateStatus, ClientStatus, EntityKind, StatusGraph}
    },
    port::{
        command::Command,
        storage::{ChangeSet, Mutation, Precondition, WorkflowStore}
    }
};

const CLIENT_CREATED: &str = "Client created";
const CLIENT_ARCHIVED: &str = "Client archived";
const CANDIDATE_CREATED: &str = "Candidate created";

// **********************
// Shared checks
// **********************

/// Legal edge check, reporting the allowed targets on failure
fn check_transition<S: StatusGraph>(from: S, to: S) -> Result<(), WorkflowError> {
    if from.is_valid_transition(to) {
        Ok(())
    } else {
        Err(WorkflowError::InvalidTransition {
            entity:  S::ENTITY,
            from:    from.to_string(),
            to:      to.to_string(),
            allowed: from.target_names()
        })
    }
}

/// Critical edges need a non-blank comment on every path
fn check_comment<S: StatusGraph>(from: S, to: S, comment: &Option<String>) -> Result<(), WorkflowError> {
    let present = comment.as_deref().is_some_and(|text| !text.trim().is_empty());
    if from.requires_comment(to) && !present {
        return Err(WorkflowError::CommentRequired { from: from.to_string(), to: to.to_string() });
    }
    Ok(())
}

fn require_name(name: &str, what: &str) -> Result<(), WorkflowError> {
    if name.trim().is_empty() {
        return Err(WorkflowError::Validation(format!("{} name is required", what)));
    }
    Ok(())
}

/// `local@domain.tld` without whitespace
fn check_email(email: &str) -> Result<(), WorkflowError> {
    let plausible = !email.chars().any(char::is_whitespace)
        && email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty()
                && !domain.contains('@')
                && domain.rsplit_once('.').is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        });
    if plausible {
        Ok(())
    } else {
        Err(WorkflowError::Validation(format!("Invalid email address: {}", email)))
    }
}

async fn load_client(store: &dyn WorkflowStore, client_id: &str) -> Result<Client, WorkflowError> {
    store.get_client(client_id).await?.ok_or_else(|| WorkflowError::not_found("Client", client_id))
}

async fn load_candidate(store: &dyn WorkflowStore, candidate_id: &str) -> Result<Candidate, WorkflowError> {
    store.get_candidate(candidate_id).await?.ok_or_else(|| WorkflowError::not_found("Candidate", candidate_id))
}

async fn load_user(store: &dyn WorkflowStore, user_id: &str) -> Result<UserProfile, WorkflowError> {
    store.get_user(user_id).await?.ok_or_else(|| WorkflowError::not_found("User", user_id))
}

async fn load_review(
    store: &dyn WorkflowStore,
    client_id: &str,
    request_id: &str
) -> Result<ReviewData, WorkflowError> {
    let request = store
        .get_request(request_id)
        .await?
        .ok_or_else(|| WorkflowError::not_found("Status change request", request_id))?;
    let client = store.get_client(client_id).await?;
    Ok(ReviewData { request, client })
}

/// Request must target this client and still be pending
fn check_review(request: &StatusChangeRequest, client_id: &str) -> Result<(), WorkflowError> {
    if request.client_id != client_id {
        return Err(WorkflowError::Mismatch {
            resource:  "Status change request",
            id:        request.id.clone(),
            parent_id: client_id.to_string()
        });
    }
    request.ensure_pending()
}

/// Client after a status change, with the matching history row
fn client_transition(
    client: Client,
    to: ClientStatus,
    comment: Option<String>,
    changed_by: &str,
    now: DateTime<Utc>
) -> (Client, ClientStatusHistory) {
    let history = ClientStatusHistory::new(&client.id, client.status, to, comment, changed_by, now);
    let updated = Client { status: to, updated_by: changed_by.to_string(), updated_at: now, ..client };
    (updated, history)
}

// **********************
// Users
// **********************

/// Identity checks shared by registration and bootstrap; `directory` is every
/// registered user
fn check_new_user(id: &str, name: &str, email: &str, directory: &[UserProfile]) -> Result<(), WorkflowError> {
    if id.trim().is_empty() {
        return Err(WorkflowError::Validation("User id is required".to_string()));
    }
    require_name(name, "User")?;
    check_email(email.trim())?;
    if directory.iter().any(|user| user.id == id) {
        return Err(WorkflowError::Validation(format!("User {} already exists", id)));
    }
    let key = email_key(email);
    if directory.iter().any(|user| email_key(&user.email) == key) {
        return Err(WorkflowError::Validation(format!("Email already registered: {}", email.trim())));
    }
    Ok(())
}

fn new_user(id: &str, name: &str, email: &str, role: Role, status: UserStatus) -> UserProfile {
    UserProfile {
        id: id.to_string(),
        name: name.trim().to_string(),
        email: email.trim().to_string(),
        role,
        status
    }
}

/// Account actions run against the target's current role and status, so a
/// concurrent approval or role change makes the second commit fail
fn account_update(user: &UserProfile, updated: UserProfile) -> ChangeSet {
    ChangeSet::new()
        .expect(Precondition::UserIs { user_id: user.id.clone(), role: user.role, status: user.status })
        .with(Mutation::PutUser(updated))
}

fn account_denied(actor: &Actor, action: &'static str) -> WorkflowError {
    WorkflowError::AccountActionDenied { role: actor.role, action }
}

#[async_trait]
impl Command for RegisterUserCommand {
    type Loaded = Vec<UserProfile>;
    type Output = UserProfile;

    /// Anyone may sign up; the account stays unusable until approved
    fn authorize(&self) -> Result<(), WorkflowError> {
        Ok(())
    }

    async fn load(&self, store: &dyn WorkflowStore) -> Result<Self::Loaded, WorkflowError> {
        store.list_users().await
    }

    fn validate(&self, directory: &Self::Loaded) -> Result<(), WorkflowError> {
        check_new_user(&self.id, &self.name, &self.email, directory)
    }

    fn emit(&self, _directory: Self::Loaded, _now: DateTime<Utc>) -> Result<(ChangeSet, Self::Output), WorkflowError> {
        let user = new_user(&self.id, &self.name, &self.email, Role::Admin, UserStatus::Pending);
        Ok((ChangeSet::new().with(Mutation::InsertUser(user.clone())), user))
    }

    fn name(&self) -> &'static str {
        "register-user"
    }

    fn target_id(&self) -> Option<&str> {
        Some(&self.id)
    }
}

#[async_trait]
impl Command for BootstrapOwnerCommand {
    type Loaded = Vec<UserProfile>;
    type Output = UserProfile;

    fn authorize(&self) -> Result<(), WorkflowError> {
        Ok(())
    }

    async fn load(&self, store: &dyn WorkflowStore) -> Result<Self::Loaded, WorkflowError> {
        store.list_users().await
    }

    fn validate(&self, directory: &Self::Loaded) -> Result<(), WorkflowError> {
        if !directory.is_empty() {
            return Err(WorkflowError::Validation("User directory is already initialised".to_string()));
        }
        check_new_user(&self.id, &self.name, &self.email, directory)
    }

    fn emit(&self, _directory: Self::Loaded, _now: DateTime<Utc>) -> Result<(ChangeSet, Self::Output), WorkflowError> {
        let owner = new_user(&self.id, &self.name, &self.email, Role::Owner, UserStatus::Active);
        let changes = ChangeSet::new().expect(Precondition::DirectoryEmpty).with(Mutation::InsertUser(owner.clone()));
        Ok((changes, owner))
    }

    fn name(&self) -> &'static str {
        "bootstrap-owner"
    }

    fn target_id(&self) -> Option<&str> {
        Some(&self.id)
    }
}

#[async_trait]
impl Command for ApproveUserCommand {
    type Loaded = UserProfile;
    type Output = UserProfile;

    fn authorize(&self) -> Result<(), WorkflowError> {
        if can_approve_registrations(self.actor.role) {
            Ok(())
        } else {
            Err(account_denied(&self.actor, "approve"))
        }
    }

    async fn load(&self, store: &dyn WorkflowStore) -> Result<Self::Loaded, WorkflowError> {
        load_user(store, &self.user_id).await
    }

    fn validate(&self, user: &Self::Loaded) -> Result<(), WorkflowError> {
        if user.status != UserStatus::Pending {
            return Err(WorkflowError::Validation(format!("User {} is {}, not PENDING", user.id, user.status)));
        }
        Ok(())
    }

    fn emit(&self, user: Self::Loaded, _now: DateTime<Utc>) -> Result<(ChangeSet, Self::Output), WorkflowError> {
        let approved = UserProfile { status: UserStatus::Active, ..user.clone() };
        Ok((account_update(&user, approved.clone()), approved))
    }

    fn name(&self) -> &'static str {
        "approve-user"
    }

    fn target_id(&self) -> Option<&str> {
        Some(&self.user_id)
    }
}

#[async_trait]
impl Command for SuspendUserCommand {
    type Loaded = UserProfile;
    type Output = UserProfile;

    fn authorize(&self) -> Result<(), WorkflowError> {
        if can_suspend_users(self.actor.role) {
            Ok(())
        } else {
            Err(account_denied(&self.actor, "suspend"))
        }
    }

    async fn load(&self, store: &dyn WorkflowStore) -> Result<Self::Loaded, WorkflowError> {
        load_user(store, &self.user_id).await
    }

    fn validate(&self, user: &Self::Loaded) -> Result<(), WorkflowError> {
        if user.status == UserStatus::Suspended {
            return Err(WorkflowError::Validation(format!("User {} is already SUSPENDED", user.id)));
        }
        Ok(())
    }

    fn emit(&self, user: Self::Loaded, _now: DateTime<Utc>) -> Result<(ChangeSet, Self::Output), WorkflowError> {
        let suspended = UserProfile { status: UserStatus::Suspended, ..user.clone() };
        Ok((account_update(&user, suspended.clone()), suspended))
    }

    fn name(&self) -> &'static str {
        "suspend-user"
    }

    fn target_id(&self) -> Option<&str> {
        Some(&self.user_id)
    }
}

#[async_trait]
impl Command for ChangeUserRoleCommand {
    type Loaded = UserProfile;
    type Output = UserProfile;

    fn authorize(&self) -> Result<(), WorkflowError> {
        if can_manage_users(self.actor.role, self.new_role) {
            Ok(())
        } else {
            Err(WorkflowError::UserManagementDenied { role: self.actor.role, target: self.new_role })
        }
    }

    async fn load(&self, store: &dyn WorkflowStore) -> Result<Self::Loaded, WorkflowError> {
        load_user(store, &self.user_id).await
    }

    fn validate(&self, user: &Self::Loaded) -> Result<(), WorkflowError> {
        if !can_manage_users(self.actor.role, user.role) {
            return Err(WorkflowError::UserManagementDenied { role: self.actor.role, target: user.role });
        }
        Ok(())
    }

    fn emit(&self, user: Self::Loaded, _now: DateTime<Utc>) -> Result<(ChangeSet, Self::Output), WorkflowError> {
        let updated = UserProfile { role: self.new_role, ..user.clone() };
        Ok((account_update(&user, updated.clone()), updated))
    }

    fn name(&self) -> &'static str {
        "change-user-role"
    }

    fn target_id(&self) -> Option<&str> {
        Some(&self.user_id)
    }
}

// **********************
// Clients
// **********************

#[async_trait]
impl Command for CreateClientCommand {
    type Loaded = ();
    type Output = Client;

    fn authorize(&self) -> Result<(), WorkflowError> {
        self.actor.ensure(EntityKind::Client, Action::Create)
    }

    async fn load(&self, _store: &dyn WorkflowStore) -> Result<Self::Loaded, WorkflowError> {
        Ok(())
    }

    fn validate(&self, _loaded: &Self::Loaded) -> Result<(), WorkflowError> {
        require_name(&self.name, "Client")
    }

    fn emit(&self, _loaded: Self::Loaded, now: DateTime<Utc>) -> Result<(ChangeSet, Self::Output), WorkflowError> {
        let client = Client {
            id:          new_id(),
            name:        self.name.trim().to_string(),
            industry:    normalize_comment(self.industry.clone()),
            status:      ClientStatus::Prospect,
            assigned_to: Some(self.actor.id.clone()),
            created_by:  self.actor.id.clone(),
            updated_by:  self.actor.id.clone(),
            created_at:  now,
            updated_at:  now
        };

        let changes = ChangeSet::new()
            .with(Mutation::PutClient(client.clone()))
            .with(Mutation::AppendClientHistory(ClientStatusHistory::creation(
                &client.id,
                ClientStatus::Prospect,
                CLIENT_CREATED,
                &self.actor.id,
                now
            )))
            .with(Mutation::AppendClientAssignment(AssignmentRecord::new(&client.id, &self.actor.id, &self.actor.id, now)));
        Ok((changes, client))
    }

    fn name(&self) -> &'static str {
        "create-client"
    }
}

#[async_trait]
impl Command for ApplyClientStatusCommand {
    type Loaded = Client;
    type Output = Client;

    fn authorize(&self) -> Result<(), WorkflowError> {
        self.actor.ensure(EntityKind::Client, Action::ApplyStatus)
    }

    async fn load(&self, store: &dyn WorkflowStore) -> Result<Self::Loaded, WorkflowError> {
        load_client(store, &self.client_id).await
    }

    fn validate(&self, client: &Self::Loaded) -> Result<(), WorkflowError> {
        check_transition(client.status, self.to_status)?;
        check_comment(client.status, self.to_status, &self.comment)
    }

    fn emit(&self, client: Self::Loaded, now: DateTime<Utc>) -> Result<(ChangeSet, Self::Output), WorkflowError> {
        let from = client.status;
        let (updated, history) =
            client_transition(client, self.to_status, normalize_comment(self.comment.clone()), &self.actor.id, now);

        let changes = ChangeSet::new()
            .expect(Precondition::ClientStatusIs { client_id: updated.id.clone(), status: from })
            .with(Mutation::PutClient(updated.clone()))
            .with(Mutation::AppendClientHistory(history));
        Ok((changes, updated))
    }

    fn name(&self) -> &'static str {
        "apply-client-status"
    }

    fn target_id(&self) -> Option<&str> {
        Some(&self.client_id)
    }
}

#[async_trait]
impl Command for CreateStatusRequestCommand {
    type Loaded = Client;
    type Output = StatusChangeRequest;

    fn authorize(&self) -> Result<(), WorkflowError> {
        self.actor.ensure(EntityKind::Client, Action::RequestStatus)
    }

    async fn load(&self, store: &dyn WorkflowStore) -> Result<Self::Loaded, WorkflowError> {
        load_client(store, &self.client_id).await
    }

    fn validate(&self, client: &Self::Loaded) -> Result<(), WorkflowError> {
        check_transition(client.status, self.to_status)?;
        check_comment(client.status, self.to_status, &self.comment)
    }

    fn emit(&self, client: Self::Loaded, now: DateTime<Utc>) -> Result<(ChangeSet, Self::Output), WorkflowError> {
        let request = StatusChangeRequest::pending(
            &client.id,
            client.status,
            self.to_status,
            normalize_comment(self.comment.clone()),
            &self.actor.id,
            now
        );

        let changes = ChangeSet::new()
            .expect(Precondition::ClientStatusIs { client_id: client.id.clone(), status: client.status })
            .with(Mutation::PutRequest(request.clone()));
        Ok((changes, request))
    }

    fn name(&self) -> &'static str {
        "create-status-request"
    }

    fn target_id(&self) -> Option<&str> {
        Some(&self.client_id)
    }
}

#[async_trait]
impl Command for ApproveStatusRequestCommand {
    type Loaded = ReviewData;
    type Output = StatusChangeRequest;

    fn authorize(&self) -> Result<(), WorkflowError> {
        self.actor.ensure(EntityKind::Client, Action::ReviewRequest)
    }

    async fn load(&self, store: &dyn WorkflowStore) -> Result<Self::Loaded, WorkflowError> {
        load_review(store, &self.client_id, &self.request_id).await
    }

    fn validate(&self, loaded: &Self::Loaded) -> Result<(), WorkflowError> {
        check_review(&loaded.request, &self.client_id)?;

        let client = loaded.client.as_ref().ok_or_else(|| WorkflowError::not_found("Client", &self.client_id))?;
        if client.status != loaded.request.from_status {
            return Err(WorkflowError::Conflict {
                entity:   EntityKind::Client,
                id:       client.id.clone(),
                expected: loaded.request.from_status.to_string(),
                actual:   client.status.to_string()
            });
        }
        Ok(())
    }

    fn emit(&self, loaded: Self::Loaded, now: DateTime<Utc>) -> Result<(ChangeSet, Self::Output), WorkflowError> {
        let ReviewData { request, client } = loaded;
        let client = client.ok_or_else(|| WorkflowError::not_found("Client", &self.client_id))?;

        let approved = request.approve(&self.actor.id, now)?;
        let (updated, history) =
            client_transition(client, request.to_status, request.comment.clone(), &self.actor.id, now);

        let changes = ChangeSet::new()
            .expect(Precondition::RequestPending { request_id: request.id.clone() })
            .expect(Precondition::ClientStatusIs { client_id: updated.id.clone(), status: request.from_status })
            .with(Mutation::PutRequest(approved.clone()))
            .with(Mutation::PutClient(updated))
            .with(Mutation::AppendClientHistory(history));
        Ok((changes, approved))
    }

    fn name(&self) -> &'static str {
        "approve-status-request"
    }

    fn target_id(&self) -> Option<&str> {
        Some(&self.request_id)
    }
}

#[async_trait]
impl Command for RejectStatusRequestCommand {
    type Loaded = ReviewData;
    type Output = StatusChangeRequest;

    fn authorize(&self) -> Result<(), WorkflowError> {
        self.actor.ensure(EntityKind::Client, Action::ReviewRequest)
    }

    async fn load(&self, store: &dyn WorkflowStore) -> Result<Self::Loaded, WorkflowError> {
        load_review(store, &self.client_id, &self.request_id).await
    }

    fn validate(&self, loaded: &Self::Loaded) -> Result<(), WorkflowError> {
        check_review(&loaded.request, &self.client_id)
    }

    fn emit(&self, loaded: Self::Loaded, now: DateTime<Utc>) -> Result<(ChangeSet, Self::Output), WorkflowError> {
        let rejected = loaded.request.reject(&self.actor.id, now, normalize_comment(self.review_comment.clone()))?;

        let changes = ChangeSet::new()
            .expect(Precondition::RequestPending { request_id: rejected.id.clone() })
            .with(Mutation::PutRequest(rejected.clone()));
        Ok((changes, rejected))
    }

    fn name(&self) -> &'static str {
        "reject-status-request"
    }

    fn target_id(&self) -> Option<&str> {
        Some(&self.request_id)
    }
}

#[async_trait]
impl Command for ArchiveClientCommand {
    type Loaded = Client;
    type Output = Client;

    fn authorize(&self) -> Result<(), WorkflowError> {
        self.actor.ensure(EntityKind::Client, Action::Archive)
    }

    async fn load(&self, store: &dyn WorkflowStore) -> Result<Self::Loaded, WorkflowError> {
        load_client(store, &self.client_id).await
    }

    fn validate(&self, client: &Self::Loaded) -> Result<(), WorkflowError> {
        check_transition(client.status, ClientStatus::Archived)
    }

    fn emit(&self, client: Self::Loaded, now: DateTime<Utc>) -> Result<(ChangeSet, Self::Output), WorkflowError> {
        let from = client.status;
        let (updated, history) =
            client_transition(client, ClientStatus::Archived, Some(CLIENT_ARCHIVED.to_string()), &self.actor.id, now);

        let changes = ChangeSet::new()
            .expect(Precondition::ClientStatusIs { client_id: updated.id.clone(), status: from })
            .with(Mutation::PutClient(updated.clone()))
            .with(Mutation::AppendClientHistory(history));
        Ok((changes, updated))
    }

    fn name(&self) -> &'static str {
        "archive-client"
    }

    fn target_id(&self) -> Option<&str> {
        Some(&self.client_id)
    }
}

#[async_trait]
impl Command for AssignClientCommand {
    type Loaded = ClientAssignmentData;
    type Output = Client;

    fn authorize(&self) -> Result<(), WorkflowError> {
        self.actor.ensure(EntityKind::Client, Action::Assign)
    }

    async fn load(&self, store: &dyn WorkflowStore) -> Result<Self::Loaded, WorkflowError> {
        let assignee = load_user(store, &self.assignee_id).await?;
        let client = load_client(store, &self.client_id).await?;
        Ok(ClientAssignmentData { client, assignee })
    }

    fn validate(&self, loaded: &Self::Loaded) -> Result<(), WorkflowError> {
        if !matches!(loaded.assignee.role, Role::Owner | Role::Manager) {
            return Err(WorkflowError::Validation("Clients can only be assigned to an Owner or Manager".to_string()));
        }
        Ok(())
    }

    fn emit(&self, loaded: Self::Loaded, now: DateTime<Utc>) -> Result<(ChangeSet, Self::Output), WorkflowError> {
        let ClientAssignmentData { client, assignee } = loaded;
        let updated = Client {
            assigned_to: Some(assignee.id.clone()),
            updated_by: self.actor.id.clone(),
            updated_at: now,
            ..client
        };

        let changes = ChangeSet::new()
            .expect(Precondition::ClientExists { client_id: updated.id.clone() })
            .expect(Precondition::UserExists { user_id: assignee.id.clone() })
            .with(Mutation::PutClient(updated.clone()))
            .with(Mutation::AppendClientAssignment(AssignmentRecord::new(&updated.id, &assignee.id, &self.actor.id, now)));
        Ok((changes, updated))
    }

    fn name(&self) -> &'static str {
        "assign-client"
    }

    fn target_id(&self) -> Option<&str> {
        Some(&self.client_id)
    }
}

#[async_trait]
impl Command for AddClientCommentCommand {
    type Loaded = Client;
    type Output = ClientComment;

    fn authorize(&self) -> Result<(), WorkflowError> {
        self.actor.ensure(EntityKind::Client, Action::Comment)
    }

    async fn load(&self, store: &dyn WorkflowStore) -> Result<Self::Loaded, WorkflowError> {
        load_client(store, &self.client_id).await
    }

    fn validate(&self, _client: &Self::Loaded) -> Result<(), WorkflowError> {
        require_content(&self.content, "Comment").map(|_| ())
    }

    fn emit(&self, client: Self::Loaded, now: DateTime<Utc>) -> Result<(ChangeSet, Self::Output), WorkflowError> {
        let comment = ClientComment {
            id:         new_id(),
            client_id:  client.id.clone(),
            content:    require_content(&self.content, "Comment")?,
            created_by: self.actor.id.clone(),
            created_at: now
        };

        let changes = ChangeSet::new()
            .expect(Precondition::ClientExists { client_id: client.id })
            .with(Mutation::AppendClientComment(comment.clone()));
        Ok((changes, comment))
    }

    fn name(&self) -> &'static str {
        "add-client-comment"
    }

    fn target_id(&self) -> Option<&str> {
        Some(&self.client_id)
    }
}

#[async_trait]
impl Command for AddStatusCommentCommand {
    type Loaded = StatusCommentData;
    type Output = StatusComment;

    fn authorize(&self) -> Result<(), WorkflowError> {
        self.actor.ensure(EntityKind::Client, Action::Comment)
    }

    async fn load(&self, store: &dyn WorkflowStore) -> Result<Self::Loaded, WorkflowError> {
        let history = store.get_client_history_entry(&self.history_id).await?;
        Ok(StatusCommentData { history })
    }

    fn validate(&self, loaded: &Self::Loaded) -> Result<(), WorkflowError> {
        require_content(&self.content, "Comment")?;
        let history = loaded
            .history
            .as_ref()
            .ok_or_else(|| WorkflowError::not_found("Status history entry", &self.history_id))?;
        if history.entity_id != self.client_id {
            return Err(WorkflowError::Mismatch {
                resource:  "Status history entry",
                id:        history.id.clone(),
                parent_id: self.client_id.clone()
            });
        }
        Ok(())
    }

    fn emit(&self, loaded: Self::Loaded, now: DateTime<Utc>) -> Result<(ChangeSet, Self::Output), WorkflowError> {
        let history = loaded.history.ok_or_else(|| WorkflowError::not_found("Status history entry", &self.history_id))?;
        let comment = StatusComment {
            id:         new_id(),
            history_id: history.id,
            client_id:  history.entity_id,
            content:    require_content(&self.content, "Comment")?,
            created_by: self.actor.id.clone(),
            created_at: now
        };

        let changes = ChangeSet::new()
            .expect(Precondition::ClientExists { client_id: comment.client_id.clone() })
            .with(Mutation::AppendStatusComment(comment.clone()));
        Ok((changes, comment))
    }

    fn name(&self) -> &'static str {
        "add-status-comment"
    }

    fn target_id(&self) -> Option<&str> {
        Some(&self.history_id)
    }
}

// **********************
// Candidates
// **********************

#[async_trait]
impl Command for CreateCandidateCommand {
    type Loaded = Option<UserProfile>;
    type Output = Candidate;

    fn authorize(&self) -> Result<(), WorkflowError> {
        self.actor.ensure(EntityKind::Candidate, Action::Create)
    }

    async fn load(&self, store: &dyn WorkflowStore) -> Result<Self::Loaded, WorkflowError> {
        match &self.assigned_to {
            Some(user_id) => load_user(store, user_id).await.map(Some),
            None => Ok(None)
        }
    }

    fn validate(&self, _assignee: &Self::Loaded) -> Result<(), WorkflowError> {
        require_name(&self.name, "Candidate")?;
        check_email(self.email.trim())
    }

    fn emit(&self, assignee: Self::Loaded, now: DateTime<Utc>) -> Result<(ChangeSet, Self::Output), WorkflowError> {
        let assigned_to = assignee.map(|user| user.id).unwrap_or_else(|| self.actor.id.clone());
        let candidate = Candidate {
            id:          new_id(),
            name:        self.name.trim().to_string(),
            email:       self.email.trim().to_string(),
            status:      CandidateStatus::Applied,
            assigned_to: Some(assigned_to.clone()),
            created_by:  self.actor.id.clone(),
            updated_by:  self.actor.id.clone(),
            created_at:  now,
            updated_at:  now
        };

        let mut changes = ChangeSet::new();
        if self.assigned_to.is_some() {
            changes = changes.expect(Precondition::UserExists { user_id: assigned_to.clone() });
        }
        let changes = changes
            .with(Mutation::PutCandidate(candidate.clone()))
            .with(Mutation::AppendCandidateHistory(CandidateStatusHistory::creation(
                &candidate.id,
                CandidateStatus::Applied,
                CANDIDATE_CREATED,
                &self.actor.id,
                now
            )))
            .with(Mutation::AppendCandidateAssignment(AssignmentRecord::new(
                &candidate.id,
                assigned_to,
                &self.actor.id,
                now
            )));
        Ok((changes, candidate))
    }

    fn name(&self) -> &'static str {
        "create-candidate"
    }
}

#[async_trait]
impl Command for UpdateCandidateStatusCommand {
    type Loaded = Candidate;
    type Output = Candidate;

    fn authorize(&self) -> Result<(), WorkflowError> {
        self.actor.ensure(EntityKind::Candidate, Action::ApplyStatus)
    }

    async fn load(&self, store: &dyn WorkflowStore) -> Result<Self::Loaded, WorkflowError> {
        load_candidate(store, &self.candidate_id).await
    }

    fn validate(&self, candidate: &Self::Loaded) -> Result<(), WorkflowError> {
        if candidate.status == self.to_status {
            return Err(WorkflowError::NoOp { status: candidate.status.to_string() });
        }
        check_transition(candidate.status, self.to_status)
    }

    fn emit(&self, candidate: Self::Loaded, now: DateTime<Utc>) -> Result<(ChangeSet, Self::Output), WorkflowError> {
        let from = candidate.status;
        let history = CandidateStatusHistory::new(
            &candidate.id,
            from,
            self.to_status,
            normalize_comment(self.comment.clone()),
            &self.actor.id,
            now
        );
        let updated =
            Candidate { status: self.to_status, updated_by: self.actor.id.clone(), updated_at: now, ..candidate };

        let changes = ChangeSet::new()
            .expect(Precondition::CandidateStatusIs { candidate_id: updated.id.clone(), status: from })
            .with(Mutation::PutCandidate(updated.clone()))
            .with(Mutation::AppendCandidateHistory(history));
        Ok((changes, updated))
    }

    fn name(&self) -> &'static str {
        "update-candidate-status"
    }

    fn target_id(&self) -> Option<&str> {
        Some(&self.candidate_id)
    }
}

#[async_trait]
impl Command for AssignCandidateCommand {
    type Loaded = CandidateAssignmentData;
    type Output = Candidate;

    fn authorize(&self) -> Result<(), WorkflowError> {
        self.actor.ensure(EntityKind::Candidate, Action::Assign)
    }

    async fn load(&self, store: &dyn WorkflowStore) -> Result<Self::Loaded, WorkflowError> {
        let assignee = load_user(store, &self.assignee_id).await?;
        let candidate = load_candidate(store, &self.candidate_id).await?;
        Ok(CandidateAssignmentData { candidate, assignee })
    }

    fn validate(&self, _loaded: &Self::Loaded) -> Result<(), WorkflowError> {
        Ok(())
    }

    fn emit(&self, loaded: Self::Loaded, now: DateTime<Utc>) -> Result<(ChangeSet, Self::Output), WorkflowError> {
        let CandidateAssignmentData { candidate, assignee } = loaded;
        let updated = Candidate {
            assigned_to: Some(assignee.id.clone()),
            updated_by: self.actor.id.clone(),
            updated_at: now,
            ..candidate
        };

        let changes = ChangeSet::new()
            .expect(Precondition::CandidateExists { candidate_id: updated.id.clone() })
            .expect(Precondition::UserExists { user_id: assignee.id.clone() })
            .with(Mutation::PutCandidate(updated.clone()))
            .with(Mutation::AppendCandidateAssignment(AssignmentRecord::new(
                &updated.id,
                &assignee.id,
                &self.actor.id,
                now
            )));
        Ok((changes, updated))
    }

    fn name(&self) -> &'static str {
        "assign-candidate"
    }

    fn target_id(&self) -> Option<&str> {
        Some(&self.candidate_id)
    }
}

#[async_trait]
impl Command for AddCandidateNoteCommand {
    type Loaded = Candidate;
    type Output = CandidateNote;

    fn authorize(&self) -> Result<(), WorkflowError> {
        self.actor.ensure(EntityKind::Candidate, Action::Comment)
    }

    async fn load(&self, store: &dyn WorkflowStore) -> Result<Self::Loaded, WorkflowError> {
        load_candidate(store, &self.candidate_id).await
    }

    fn validate(&self, _candidate: &Self::Loaded) -> Result<(), WorkflowError> {
        require_content(&self.content, "Note").map(|_| ())
    }

    fn emit(&self, candidate: Self::Loaded, now: DateTime<Utc>) -> Result<(ChangeSet, Self::Output), WorkflowError> {
        let note = CandidateNote {
            id:           new_id(),
            candidate_id: candidate.id.clone(),
            content:      require_content(&self.content, "Note")?,
            created_by:   self.actor.id.clone(),
            created_at:   now
        };

        let changes = ChangeSet::new()
            .expect(Precondition::CandidateExists { candidate_id: candidate.id })
            .with(Mutation::AppendCandidateNote(note.clone()));
        Ok((changes, note))
    }

    fn name(&self) -> &'static str {
        "add-candidate-note"
    }

    fn target_id(&self) -> Option<&str> {
        Some(&self.candidate_id)
    }
}

#[async_trait]
impl Command for DeleteCandidateCommand {
    type Loaded = Candidate;
    type Output = Candidate;

    fn authorize(&self) -> Result<(), WorkflowError> {
        self.actor.ensure(EntityKind::Candidate, Action::Delete)
    }

    async fn load(&self, store: &dyn WorkflowStore) -> Result<Self::Loaded, WorkflowError> {
        load_candidate(store, &self.candidate_id).await
    }

    fn validate(&self, _candidate: &Self::Loaded) -> Result<(), WorkflowError> {
        Ok(())
    }

    fn emit(&self, candidate: Self::Loaded, _now: DateTime<Utc>) -> Result<(ChangeSet, Self::Output), WorkflowError> {
        let changes = ChangeSet::new()
            .expect(Precondition::CandidateExists { candidate_id: candidate.id.clone() })
            .with(Mutation::DeleteCandidate { candidate_id: candidate.id.clone() });
        Ok((changes, candidate))
    }

    fn name(&self) -> &'static str {
        "delete-candidate"
    }

    fn target_id(&self) -> Option<&str> {
        Some(&self.candidate_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(status: ClientStatus) -> Client {
        let now = Utc::now();
        Client {
            id: "c-1".into(),
            name: "Acme".into(),
            industry: None,
            status,
            assigned_to: None,
            created_by: "o-1".into(),
            updated_by: "o-1".into(),
            created_at: now,
            updated_at: now
        }
    }

    #[test]
    fn email_plausibility() {
        assert!(check_email("casey@example.com").is_ok());
        assert!(check_email("a.b@sub.example.io").is_ok());
        for bad in ["", "casey", "@example.com", "casey@", "casey@example", "ca sey@example.com", "a@b@c.com", "a@.com"] {
            assert!(check_email(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn blank_comment_does_not_satisfy_critical_edge() {
        let err = check_comment(ClientStatus::Prospect, ClientStatus::Active, &Some("  ".into())).unwrap_err();
        assert!(matches!(err, WorkflowError::CommentRequired { .. }));
        assert!(check_comment(ClientStatus::Prospect, ClientStatus::Archived, &None).is_ok());
    }

    #[test]
    fn direct_apply_emits_status_and_history_together() {
        let command = ApplyClientStatusCommand {
            actor:     Actor::new("o-1", Role::Owner),
            client_id: "c-1".into(),
            to_status: ClientStatus::Active,
            comment:   Some("signed".into())
        };
        let loaded = client(ClientStatus::Prospect);
        command.validate(&loaded).unwrap();

        let (changes, updated) = command.emit(loaded, Utc::now()).unwrap();
        assert_eq!(updated.status, ClientStatus::Active);
        assert_eq!(changes.preconditions, vec![Precondition::ClientStatusIs {
            client_id: "c-1".into(),
            status:    ClientStatus::Prospect
        }]);
        assert_eq!(changes.mutations.len(), 2);
        match &changes.mutations[1] {
            Mutation::AppendClientHistory(row) => {
                assert_eq!((row.from_status, row.to_status), (ClientStatus::Prospect, ClientStatus::Active));
                assert_eq!(row.comment.as_deref(), Some("signed"));
                assert_eq!(row.changed_by, "o-1");
            }
            other => panic!("Expected history row, got {:?}", other)
        }
    }

    #[test]
    fn archive_follows_transition_table() {
        let command = ArchiveClientCommand { actor: Actor::new("o-1", Role::Owner), client_id: "c-1".into() };
        assert!(command.validate(&client(ClientStatus::Active)).is_ok());
        let err = command.validate(&client(ClientStatus::Archived)).unwrap_err();
        assert_eq!(err.allowed_targets(), Some(&[][..]));
    }

    #[test]
    fn role_change_needs_authority_over_both_roles() {
        let target = new_user("u-2", "Pat", "pat@example.com", Role::Admin, UserStatus::Active);

        let promote = ChangeUserRoleCommand {
            actor:    Actor::new("m-1", Role::Manager),
            user_id:  "u-2".into(),
            new_role: Role::Owner
        };
        assert!(matches!(promote.authorize(), Err(WorkflowError::UserManagementDenied { .. })));

        let promote = ChangeUserRoleCommand { new_role: Role::Manager, ..promote };
        promote.authorize().unwrap();
        promote.validate(&target).unwrap();

        let owner = UserProfile { role: Role::Owner, ..target.clone() };
        assert!(promote.validate(&owner).is_err());

        let (changes, updated) = promote.emit(target, Utc::now()).unwrap();
        assert_eq!(updated.role, Role::Manager);
        assert_eq!(changes.preconditions, vec![Precondition::UserIs {
            user_id: "u-2".into(),
            role:    Role::Admin,
            status:  UserStatus::Active
        }]);
    }

    #[test]
    fn registration_is_pending_and_cannot_claim_taken_identity() {
        let directory = vec![new_user("admin-1", "Ada", "ada@example.com", Role::Admin, UserStatus::Active)];
        let register = RegisterUserCommand {
            id:    "casey-1".into(),
            name:  " Casey ".into(),
            email: "casey@example.com".into()
        };
        register.validate(&directory).unwrap();
        let (changes, user) = register.emit(directory.clone(), Utc::now()).unwrap();
        assert_eq!((user.role, user.status), (Role::Admin, UserStatus::Pending));
        assert_eq!(user.name, "Casey");
        assert_eq!(changes.mutations, vec![Mutation::InsertUser(user)]);

        let reused_id = RegisterUserCommand { id: "admin-1".into(), ..register.clone() };
        assert!(matches!(reused_id.validate(&directory), Err(WorkflowError::Validation(_))));

        let reused_email = RegisterUserCommand { email: "ADA@example.com".into(), ..register };
        let err = reused_email.validate(&directory).unwrap_err();
        assert_eq!(err, WorkflowError::Validation("Email already registered: ADA@example.com".to_string()));
    }

    #[test]
    fn account_actions_check_actor_rank() {
        let pending = new_user("u-3", "Sam", "sam@example.com", Role::Admin, UserStatus::Pending);

        let by_admin = ApproveUserCommand { actor: Actor::new("a-1", Role::Admin), user_id: "u-3".into() };
        assert_eq!(
            by_admin.authorize().unwrap_err(),
            WorkflowError::AccountActionDenied { role: Role::Admin, action: "approve" }
        );
        let by_manager = ApproveUserCommand { actor: Actor::new("m-1", Role::Manager), ..by_admin };
        by_manager.authorize().unwrap();
        by_manager.validate(&pending).unwrap();
        let active = UserProfile { status: UserStatus::Active, ..pending.clone() };
        assert!(by_manager.validate(&active).is_err());

        let suspend = SuspendUserCommand { actor: Actor::new("m-1", Role::Manager), user_id: "u-3".into() };
        assert!(matches!(suspend.authorize(), Err(WorkflowError::AccountActionDenied { action: "suspend", .. })));
        let suspend = SuspendUserCommand { actor: Actor::new("o-1", Role::Owner), ..suspend };
        suspend.authorize().unwrap();
        let (_, suspended) = suspend.emit(active, Utc::now()).unwrap();
        assert_eq!(suspended.status, UserStatus::Suspended);
        assert!(suspend.validate(&suspended).is_err());
    }
}
