//! CLI surface and the typed commands accepted by the status engine

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::{
    adapter::storage::StoreType,
    domain::{
        record::{Candidate, Client, ClientStatusHistory, StatusChangeRequest, UserProfile},
        role::{Actor, Role},
        status::{CandidateStatus, ClientStatus}
    }
};

/// Main CLI application
#[derive(Parser, Debug)]
#[command(author, version, about = "Client and candidate status workflow for staffing teams", long_about = None)]
pub struct HrflowCli {
    /// Id of the acting staff member; the role is read from the user directory
    #[arg(long, global = true, env = "HRFLOW_ACTOR")]
    pub actor_id: Option<String>,

    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: HrflowCliCommand
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum HrflowCliCommand {
    /// User directory commands
    User {
        #[command(subcommand)]
        command: UserCommands
    },
    /// Client lifecycle commands
    Client {
        #[command(subcommand)]
        command: ClientCommands
    },
    /// Candidate pipeline commands
    Candidate {
        #[command(subcommand)]
        command: CandidateCommands
    },
    /// List pending client status requests, oldest first
    Approvals,
    /// Storage backend management commands
    Storage {
        #[command(subcommand)]
        command: StorageCommands
    }
}

/// User directory subcommands
#[derive(Subcommand, Debug)]
pub enum UserCommands {
    /// Create the first Owner of an empty directory, already active
    Bootstrap {
        #[arg(long)]
        id:    Option<String>,
        #[arg(long)]
        name:  String,
        #[arg(long)]
        email: String
    },
    /// Sign up a staff member; the account waits for approval
    Register {
        /// Explicit id (generated when omitted)
        #[arg(long)]
        id:    Option<String>,
        #[arg(long)]
        name:  String,
        #[arg(long)]
        email: String
    },
    /// List staff members
    List,
    /// List registrations awaiting approval
    Pending,
    /// Activate a pending registration
    Approve { user_id: String },
    /// Suspend a staff member's account
    Suspend { user_id: String },
    /// Change a staff member's role
    SetRole {
        user_id: String,
        #[arg(value_enum)]
        role:    Role
    }
}

/// Client subcommands
#[derive(Subcommand, Debug)]
pub enum ClientCommands {
    /// Create a client in PROSPECT, assigned to the caller
    Create {
        #[arg(long)]
        name:     String,
        #[arg(long)]
        industry: Option<String>
    },
    /// Show one client
    Show { client_id: String },
    /// Apply a status change immediately (Owner)
    Apply {
        client_id: String,
        #[arg(value_enum)]
        status:    ClientStatus,
        #[arg(long)]
        comment:   Option<String>
    },
    /// Request a status change for review (Manager)
    Request {
        client_id: String,
        #[arg(value_enum)]
        status:    ClientStatus,
        #[arg(long)]
        comment:   Option<String>
    },
    /// Approve a pending status request (Owner)
    Approve { client_id: String, request_id: String },
    /// Reject a pending status request (Owner)
    Reject {
        client_id:      String,
        request_id:     String,
        #[arg(long)]
        review_comment: Option<String>
    },
    /// Archive a client (Owner)
    Archive { client_id: String },
    /// Assign a client to an Owner or Manager
    Assign { client_id: String, assignee_id: String },
    /// Add a comment to a client
    Comment { client_id: String, content: String },
    /// Reply to a status history entry
    StatusComment { client_id: String, history_id: String, content: String },
    /// Status history, oldest first
    History { client_id: String },
    /// Comments and status changes merged chronologically
    Timeline { client_id: String },
    /// All status requests of a client
    Requests { client_id: String }
}

/// Candidate subcommands
#[derive(Subcommand, Debug)]
pub enum CandidateCommands {
    /// Create a candidate in APPLIED
    Create {
        #[arg(long)]
        name:      String,
        #[arg(long)]
        email:     String,
        /// Assignee (defaults to the caller)
        #[arg(long)]
        assign_to: Option<String>
    },
    /// Show one candidate
    Show { candidate_id: String },
    /// Move a candidate through the pipeline
    Status {
        candidate_id: String,
        #[arg(value_enum)]
        status:       CandidateStatus,
        #[arg(long)]
        comment:      Option<String>
    },
    /// Assign a candidate to a staff member
    Assign { candidate_id: String, assignee_id: String },
    /// Add a note to a candidate
    Note { candidate_id: String, content: String },
    /// Notes, newest first
    Notes { candidate_id: String },
    /// Status history, oldest first
    History { candidate_id: String },
    /// Delete a candidate and everything it owns
    Delete { candidate_id: String }
}

/// Storage management subcommands
#[derive(Subcommand, Debug)]
pub enum StorageCommands {
    /// Set the storage backend
    Set {
        /// Storage backend
        backend: StoreType
    },
    /// Show current storage backend
    Current
}

// **********************
// Engine commands
// **********************

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterUserCommand {
    pub id:    String,
    pub name:  String,
    pub email: String
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapOwnerCommand {
    pub id:    String,
    pub name:  String,
    pub email: String
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveUserCommand {
    pub actor:   Actor,
    pub user_id: String
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendUserCommand {
    pub actor:   Actor,
    pub user_id: String
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeUserRoleCommand {
    pub actor:    Actor,
    pub user_id:  String,
    pub new_role: Role
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateClientCommand {
    pub actor:    Actor,
    pub name:     String,
    pub industry: Option<String>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyClientStatusCommand {
    pub actor:     Actor,
    pub client_id: String,
    pub to_status: ClientStatus,
    pub comment:   Option<String>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStatusRequestCommand {
    pub actor:     Actor,
    pub client_id: String,
    pub to_status: ClientStatus,
    pub comment:   Option<String>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveStatusRequestCommand {
    pub actor:      Actor,
    pub client_id:  String,
    pub request_id: String
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectStatusRequestCommand {
    pub actor:          Actor,
    pub client_id:      String,
    pub request_id:     String,
    pub review_comment: Option<String>
}

/// Request under review together with the live client it targets
#[derive(Debug, Clone)]
pub struct ReviewData {
    pub request: StatusChangeRequest,
    pub client:  Option<Client>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveClientCommand {
    pub actor:     Actor,
    pub client_id: String
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignClientCommand {
    pub actor:       Actor,
    pub client_id:   String,
    pub assignee_id: String
}

#[derive(Debug, Clone)]
pub struct ClientAssignmentData {
    pub client:   Client,
    pub assignee: UserProfile
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddClientCommentCommand {
    pub actor:     Actor,
    pub client_id: String,
    pub content:   String
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddStatusCommentCommand {
    pub actor:      Actor,
    pub client_id:  String,
    pub history_id: String,
    pub content:    String
}

#[derive(Debug, Clone)]
pub struct StatusCommentData {
    pub history: Option<ClientStatusHistory>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCandidateCommand {
    pub actor:       Actor,
    pub name:        String,
    pub email:       String,
    pub assigned_to: Option<String>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCandidateStatusCommand {
    pub actor:        Actor,
    pub candidate_id: String,
    pub to_status:    CandidateStatus,
    pub comment:      Option<String>
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignCandidateCommand {
    pub actor:        Actor,
    pub candidate_id: String,
    pub assignee_id:  String
}

#[derive(Debug, Clone)]
pub struct CandidateAssignmentData {
    pub candidate: Candidate,
    pub assignee:  UserProfile
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddCandidateNoteCommand {
    pub actor:        Actor,
    pub candidate_id: String,
    pub content:      String
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteCandidateCommand {
    pub actor:        Actor,
    pub candidate_id: String
}
