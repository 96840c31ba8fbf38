use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use tracing::{Level, event};

use crate::{
    domain::{
        command::{
            AddCandidateNoteCommand, AddClientCommentCommand, AddStatusCommentCommand, ApplyClientStatusCommand,
            ApproveStatusRequestCommand, ApproveUserCommand, ArchiveClientCommand, AssignCandidateCommand,
            AssignClientCommand, BootstrapOwnerCommand, ChangeUserRoleCommand, CreateCandidateCommand,
            CreateClientCommand, CreateStatusRequestCommand, DeleteCandidateCommand, RegisterUserCommand,
            RejectStatusRequestCommand, SuspendUserCommand, UpdateCandidateStatusCommand
        },
        constant::engine,
        error::{ErrorKind, WorkflowError},
        record::{
            AssignmentRecord, Candidate, CandidateNote, CandidateStatusHistory, Client, ClientComment,
            ClientStatusHistory, StatusChangeRequest, StatusComment, UserProfile, UserStatus, UserSummary, new_id
        },
        role::{Actor, Role},
        status::{CandidateStatus, ClientStatus},
        timeline::{TimelineItem, assemble_timeline},
        view::{ClientSummary, PendingApproval}
    },
    port::{command::Command, storage::WorkflowStore}
};

/// Status engine for clients and candidates
///
/// Holds no workflow state of its own: every call is a short transaction
/// against the store. Mutations run the command lifecycle and commit one
/// change set; reads are projections over the store.
#[derive(Clone)]
pub struct StatusEngine {
    store: Arc<dyn WorkflowStore>
}

impl StatusEngine {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    /// Run a command through authorize, load, validate and emit, then commit
    pub async fn execute<C: Command>(&self, command: C) -> Result<C::Output, WorkflowError> {
        let target = command.target_id().unwrap_or("-").to_string();
        event!(Level::DEBUG, event = engine::COMMAND_RECEIVED, command = command.name(), target = %target);

        let result = self.run(&command).await;
        match &result {
            Ok(_) => {
                event!(Level::INFO, event = engine::COMMAND_COMMITTED, command = command.name(), target = %target);
            }
            Err(e) if e.kind() == ErrorKind::Internal => {
                event!(Level::ERROR, event = engine::COMMAND_FAILED, command = command.name(), target = %target, error = %e);
            }
            Err(e) => {
                event!(
                    Level::DEBUG,
                    event = engine::COMMAND_REJECTED,
                    command = command.name(),
                    target = %target,
                    kind = %e.kind(),
                    error = %e
                );
            }
        }
        result
    }

    async fn run<C: Command>(&self, command: &C) -> Result<C::Output, WorkflowError> {
        command.authorize()?;
        let loaded = command.load(self.store.as_ref()).await?;
        command.validate(&loaded)?;

        let (changes, output) = command.emit(loaded, Utc::now())?;
        if !changes.is_empty() {
            self.store.commit(changes).await?;
        }
        Ok(output)
    }

    // **********************
    // Users
    // **********************

    /// Sign up a staff member as a PENDING Admin; the id is generated when absent
    pub async fn register_user(&self, id: Option<String>, name: &str, email: &str) -> Result<UserProfile, WorkflowError> {
        let command =
            RegisterUserCommand { id: id.unwrap_or_else(new_id), name: name.to_string(), email: email.to_string() };
        let user = self.execute(command).await?;
        event!(Level::INFO, event = engine::USER_REGISTERED, user_id = %user.id, role = %user.role, status = %user.status);
        Ok(user)
    }

    /// Create the first, already active, Owner; refused once anyone is registered
    pub async fn bootstrap_owner(&self, id: Option<String>, name: &str, email: &str) -> Result<UserProfile, WorkflowError> {
        let command =
            BootstrapOwnerCommand { id: id.unwrap_or_else(new_id), name: name.to_string(), email: email.to_string() };
        let owner = self.execute(command).await?;
        event!(Level::INFO, event = engine::USER_REGISTERED, user_id = %owner.id, role = %owner.role, status = %owner.status);
        Ok(owner)
    }

    pub async fn approve_user(&self, user_id: &str, actor: &Actor) -> Result<UserProfile, WorkflowError> {
        let user = self.execute(ApproveUserCommand { actor: actor.clone(), user_id: user_id.to_string() }).await?;
        event!(Level::INFO, event = engine::USER_STATUS_CHANGED, user_id = %user.id, status = %user.status, by = %actor.id);
        Ok(user)
    }

    pub async fn suspend_user(&self, user_id: &str, actor: &Actor) -> Result<UserProfile, WorkflowError> {
        let user = self.execute(SuspendUserCommand { actor: actor.clone(), user_id: user_id.to_string() }).await?;
        event!(Level::INFO, event = engine::USER_STATUS_CHANGED, user_id = %user.id, status = %user.status, by = %actor.id);
        Ok(user)
    }

    pub async fn change_user_role(
        &self,
        user_id: &str,
        new_role: Role,
        actor: &Actor
    ) -> Result<UserProfile, WorkflowError> {
        self.execute(ChangeUserRoleCommand { actor: actor.clone(), user_id: user_id.to_string(), new_role }).await
    }

    /// Resolve an actor id against the directory. Absent, unknown, pending and
    /// suspended ids are all unauthenticated.
    pub async fn resolve_actor(&self, actor_id: Option<&str>) -> Result<Actor, WorkflowError> {
        let actor = match actor_id {
            Some(id) => self
                .store
                .get_user(id)
                .await?
                .filter(UserProfile::is_active)
                .map(|user| Actor::new(user.id, user.role)),
            None => None
        };
        Actor::require(actor)
    }

    pub async fn list_users(&self) -> Result<Vec<UserProfile>, WorkflowError> {
        self.store.list_users().await
    }

    /// Registrations awaiting approval, by name
    pub async fn list_pending_users(&self) -> Result<Vec<UserProfile>, WorkflowError> {
        let mut pending: Vec<UserProfile> =
            self.store.list_users().await?.into_iter().filter(|user| user.status == UserStatus::Pending).collect();
        pending.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(pending)
    }

    async fn user_directory(&self) -> Result<HashMap<String, UserSummary>, WorkflowError> {
        Ok(self.store.list_users().await?.iter().map(|user| (user.id.clone(), UserSummary::from(user))).collect())
    }

    // **********************
    // Clients
    // **********************

    pub async fn create_client(
        &self,
        name: &str,
        industry: Option<String>,
        actor: &Actor
    ) -> Result<Client, WorkflowError> {
        self.execute(CreateClientCommand { actor: actor.clone(), name: name.to_string(), industry }).await
    }

    pub async fn get_client(&self, client_id: &str) -> Result<Client, WorkflowError> {
        self.store.get_client(client_id).await?.ok_or_else(|| WorkflowError::not_found("Client", client_id))
    }

    /// Owner-only status change that takes effect immediately
    pub async fn apply_client_status_direct(
        &self,
        client_id: &str,
        to_status: ClientStatus,
        comment: Option<String>,
        actor: &Actor
    ) -> Result<Client, WorkflowError> {
        self.execute(ApplyClientStatusCommand {
            actor: actor.clone(),
            client_id: client_id.to_string(),
            to_status,
            comment
        })
        .await
    }

    /// Manager proposal, validated against the client's current status
    pub async fn create_client_status_request(
        &self,
        client_id: &str,
        to_status: ClientStatus,
        comment: Option<String>,
        actor: &Actor
    ) -> Result<StatusChangeRequest, WorkflowError> {
        self.execute(CreateStatusRequestCommand {
            actor: actor.clone(),
            client_id: client_id.to_string(),
            to_status,
            comment
        })
        .await
    }

    /// Apply a pending request; fails with a conflict if the client moved since it was filed
    pub async fn approve_client_status_request(
        &self,
        client_id: &str,
        request_id: &str,
        actor: &Actor
    ) -> Result<StatusChangeRequest, WorkflowError> {
        self.execute(ApproveStatusRequestCommand {
            actor:      actor.clone(),
            client_id:  client_id.to_string(),
            request_id: request_id.to_string()
        })
        .await
    }

    pub async fn reject_client_status_request(
        &self,
        client_id: &str,
        request_id: &str,
        review_comment: Option<String>,
        actor: &Actor
    ) -> Result<StatusChangeRequest, WorkflowError> {
        self.execute(RejectStatusRequestCommand {
            actor: actor.clone(),
            client_id: client_id.to_string(),
            request_id: request_id.to_string(),
            review_comment
        })
        .await
    }

    pub async fn archive_client(&self, client_id: &str, actor: &Actor) -> Result<Client, WorkflowError> {
        self.execute(ArchiveClientCommand { actor: actor.clone(), client_id: client_id.to_string() }).await
    }

    pub async fn assign_client(&self, client_id: &str, assignee_id: &str, actor: &Actor) -> Result<Client, WorkflowError> {
        self.execute(AssignClientCommand {
            actor:       actor.clone(),
            client_id:   client_id.to_string(),
            assignee_id: assignee_id.to_string()
        })
        .await
    }

    pub async fn add_client_comment(
        &self,
        client_id: &str,
        content: &str,
        actor: &Actor
    ) -> Result<ClientComment, WorkflowError> {
        self.execute(AddClientCommentCommand {
            actor:     actor.clone(),
            client_id: client_id.to_string(),
            content:   content.to_string()
        })
        .await
    }

    pub async fn add_status_comment(
        &self,
        client_id: &str,
        history_id: &str,
        content: &str,
        actor: &Actor
    ) -> Result<StatusComment, WorkflowError> {
        self.execute(AddStatusCommentCommand {
            actor:      actor.clone(),
            client_id:  client_id.to_string(),
            history_id: history_id.to_string(),
            content:    content.to_string()
        })
        .await
    }

    /// Pending requests across all clients, oldest first, joined with requester and client
    pub async fn list_pending_approvals(&self) -> Result<Vec<PendingApproval>, WorkflowError> {
        let requests = self.store.pending_requests().await?;
        let users = self.user_directory().await?;

        let mut approvals = Vec::with_capacity(requests.len());
        for request in requests {
            let client = self
                .store
                .get_client(&request.client_id)
                .await?
                .ok_or_else(|| WorkflowError::not_found("Client", &request.client_id))?;
            let requested_by =
                users.get(&request.requested_by).cloned().unwrap_or_else(|| UserSummary::unknown(&request.requested_by));
            approvals.push(PendingApproval {
                client: ClientSummary { id: client.id, name: client.name, status: client.status },
                requested_by,
                request
            });
        }

        event!(Level::TRACE, event = engine::PROJECTION_READ, projection = "pending_approvals", items = approvals.len());
        Ok(approvals)
    }

    /// Comments, status changes and threaded status comments, ascending
    pub async fn get_entity_timeline(&self, client_id: &str) -> Result<Vec<TimelineItem>, WorkflowError> {
        self.get_client(client_id).await?;

        let comments = self.store.client_comments(client_id).await?;
        let history = self.store.client_history(client_id).await?;
        let status_comments = self.store.status_comments(client_id).await?;
        let users = self.user_directory().await?;

        let timeline = assemble_timeline(&comments, &history, &status_comments, &users);
        event!(Level::TRACE, event = engine::PROJECTION_READ, projection = "timeline", client_id = %client_id, items = timeline.len());
        Ok(timeline)
    }

    /// Status history, oldest first, starting with the creation row
    pub async fn get_client_status_history(&self, client_id: &str) -> Result<Vec<ClientStatusHistory>, WorkflowError> {
        self.get_client(client_id).await?;
        self.store.client_history(client_id).await
    }

    pub async fn list_client_requests(&self, client_id: &str) -> Result<Vec<StatusChangeRequest>, WorkflowError> {
        self.get_client(client_id).await?;
        self.store.client_requests(client_id).await
    }

    pub async fn list_client_assignments(&self, client_id: &str) -> Result<Vec<AssignmentRecord>, WorkflowError> {
        self.get_client(client_id).await?;
        self.store.client_assignments(client_id).await
    }

    // **********************
    // Candidates
    // **********************

    pub async fn create_candidate(
        &self,
        name: &str,
        email: &str,
        assigned_to: Option<String>,
        actor: &Actor
    ) -> Result<Candidate, WorkflowError> {
        self.execute(CreateCandidateCommand {
            actor: actor.clone(),
            name: name.to_string(),
            email: email.to_string(),
            assigned_to
        })
        .await
    }

    pub async fn get_candidate(&self, candidate_id: &str) -> Result<Candidate, WorkflowError> {
        self.store
            .get_candidate(candidate_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("Candidate", candidate_id))
    }

    /// Single-phase pipeline move, open to every staff role
    pub async fn update_candidate_status(
        &self,
        candidate_id: &str,
        to_status: CandidateStatus,
        comment: Option<String>,
        actor: &Actor
    ) -> Result<Candidate, WorkflowError> {
        self.execute(UpdateCandidateStatusCommand {
            actor: actor.clone(),
            candidate_id: candidate_id.to_string(),
            to_status,
            comment
        })
        .await
    }

    pub async fn assign_candidate(
        &self,
        candidate_id: &str,
        assignee_id: &str,
        actor: &Actor
    ) -> Result<Candidate, WorkflowError> {
        self.execute(AssignCandidateCommand {
            actor:        actor.clone(),
            candidate_id: candidate_id.to_string(),
            assignee_id:  assignee_id.to_string()
        })
        .await
    }

    pub async fn add_candidate_note(
        &self,
        candidate_id: &str,
        content: &str,
        actor: &Actor
    ) -> Result<CandidateNote, WorkflowError> {
        self.execute(AddCandidateNoteCommand {
            actor:        actor.clone(),
            candidate_id: candidate_id.to_string(),
            content:      content.to_string()
        })
        .await
    }

    pub async fn delete_candidate(&self, candidate_id: &str, actor: &Actor) -> Result<Candidate, WorkflowError> {
        self.execute(DeleteCandidateCommand { actor: actor.clone(), candidate_id: candidate_id.to_string() }).await
    }

    /// Notes, newest first
    pub async fn list_candidate_notes(&self, candidate_id: &str) -> Result<Vec<CandidateNote>, WorkflowError> {
        self.get_candidate(candidate_id).await?;
        let mut notes = self.store.candidate_notes(candidate_id).await?;
        notes.reverse();
        Ok(notes)
    }

    pub async fn get_candidate_status_history(
        &self,
        candidate_id: &str
    ) -> Result<Vec<CandidateStatusHistory>, WorkflowError> {
        self.get_candidate(candidate_id).await?;
        self.store.candidate_history(candidate_id).await
    }

    pub async fn list_candidate_assignments(&self, candidate_id: &str) -> Result<Vec<AssignmentRecord>, WorkflowError> {
        self.get_candidate(candidate_id).await?;
        self.store.candidate_assignments(candidate_id).await
    }
}
