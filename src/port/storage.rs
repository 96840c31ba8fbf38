//! Storage port for entities and their audit trail
//!
//! Every write goes through [`WorkflowStore::commit`] as one [`ChangeSet`]:
//! the store re-checks all preconditions against its current contents and then
//! applies every mutation, or applies nothing. Implementations must also
//! enforce the data-level guards (see [`ChangeSet`]) so no caller can resolve a
//! request twice or overwrite an audit row.

use async_trait::async_trait;

use crate::domain::{
    error::WorkflowError,
    record::{
        AssignmentRecord, Candidate, CandidateNote, CandidateStatusHistory, Client, ClientComment,
        ClientStatusHistory, StatusChangeRequest, StatusComment, UserProfile, UserStatus
    },
    role::Role,
    status::{CandidateStatus, ClientStatus}
};

/// Condition that must still hold when the change set commits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    ClientStatusIs { client_id: String, status: ClientStatus },
    CandidateStatusIs { candidate_id: String, status: CandidateStatus },
    RequestPending { request_id: String },
    ClientExists { client_id: String },
    CandidateExists { candidate_id: String },
    UserExists { user_id: String },
    /// User still holds the role and account status it was read with
    UserIs { user_id: String, role: Role, status: UserStatus },
    /// No user has been registered yet
    DirectoryEmpty
}

/// Single write inside a change set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    PutClient(Client),
    PutCandidate(Candidate),
    /// Register a new user; refused when the id or email is taken
    InsertUser(UserProfile),
    /// Update a registered user; the email never changes
    PutUser(UserProfile),
    /// Insert a new pending request or resolve a stored pending one
    PutRequest(StatusChangeRequest),
    AppendClientHistory(ClientStatusHistory),
    AppendCandidateHistory(CandidateStatusHistory),
    AppendStatusComment(StatusComment),
    AppendClientComment(ClientComment),
    AppendCandidateNote(CandidateNote),
    AppendClientAssignment(AssignmentRecord),
    AppendCandidateAssignment(AssignmentRecord),
    /// Remove a candidate and everything it owns
    DeleteCandidate { candidate_id: String }
}

impl Mutation {
    pub fn label(&self) -> &'static str {
        match self {
            Mutation::PutClient(_) => "put_client",
            Mutation::PutCandidate(_) => "put_candidate",
            Mutation::InsertUser(_) => "insert_user",
            Mutation::PutUser(_) => "put_user",
            Mutation::PutRequest(_) => "put_request",
            Mutation::AppendClientHistory(_) => "append_client_history",
            Mutation::AppendCandidateHistory(_) => "append_candidate_history",
            Mutation::AppendStatusComment(_) => "append_status_comment",
            Mutation::AppendClientComment(_) => "append_client_comment",
            Mutation::AppendCandidateNote(_) => "append_candidate_note",
            Mutation::AppendClientAssignment(_) => "append_client_assignment",
            Mutation::AppendCandidateAssignment(_) => "append_candidate_assignment",
            Mutation::DeleteCandidate { .. } => "delete_candidate"
        }
    }
}

/// Atomic unit of work
///
/// Guards checked by every store on commit, in addition to the preconditions:
/// - a request stored as approved or rejected is never rewritten;
/// - a request that is not yet stored must be pending;
/// - a pending request keeps its proposal until it is resolved;
/// - a user is inserted once per id and per email, and updated only once inserted;
/// - append mutations never replace an existing row with the same id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub preconditions: Vec<Precondition>,
    pub mutations:     Vec<Mutation>
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    pub fn with(mut self, mutation: Mutation) -> Self {
        self.mutations.push(mutation);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// Port for persisting workflow state
///
/// List reads return rows in chronological order of their own timestamp, ties
/// in insertion order, unless stated otherwise.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Verify preconditions and guards, then apply all mutations atomically
    async fn commit(&self, changes: ChangeSet) -> Result<(), WorkflowError>;

    async fn get_client(&self, client_id: &str) -> Result<Option<Client>, WorkflowError>;

    async fn get_candidate(&self, candidate_id: &str) -> Result<Option<Candidate>, WorkflowError>;

    async fn get_request(&self, request_id: &str) -> Result<Option<StatusChangeRequest>, WorkflowError>;

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, WorkflowError>;

    async fn list_users(&self) -> Result<Vec<UserProfile>, WorkflowError>;

    /// Look up a client history row by its own id
    async fn get_client_history_entry(&self, history_id: &str) -> Result<Option<ClientStatusHistory>, WorkflowError>;

    async fn client_history(&self, client_id: &str) -> Result<Vec<ClientStatusHistory>, WorkflowError>;

    async fn candidate_history(&self, candidate_id: &str) -> Result<Vec<CandidateStatusHistory>, WorkflowError>;

    async fn client_comments(&self, client_id: &str) -> Result<Vec<ClientComment>, WorkflowError>;

    /// All comments threaded onto any history entry of the client
    async fn status_comments(&self, client_id: &str) -> Result<Vec<StatusComment>, WorkflowError>;

    async fn candidate_notes(&self, candidate_id: &str) -> Result<Vec<CandidateNote>, WorkflowError>;

    async fn client_assignments(&self, client_id: &str) -> Result<Vec<AssignmentRecord>, WorkflowError>;

    async fn candidate_assignments(&self, candidate_id: &str) -> Result<Vec<AssignmentRecord>, WorkflowError>;

    /// Requests of one client, oldest first
    async fn client_requests(&self, client_id: &str) -> Result<Vec<StatusChangeRequest>, WorkflowError>;

    /// Pending requests across all clients, oldest first
    async fn pending_requests(&self) -> Result<Vec<StatusChangeRequest>, WorkflowError>;
}
