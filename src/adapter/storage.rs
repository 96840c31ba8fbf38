//! Storage implementations for workflow records
//!
//! This module provides both in-memory and persistent (RocksDB) implementations
//! of the WorkflowStore trait. Both verify a change set against their current
//! contents while holding the commit critical section, so two callers that read
//! the same status cannot both commit a transition from it.

use std::{
    collections::BTreeMap,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering}
    }
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, DB, DBCompressionType, Direction, IteratorMode, Options, WriteBatch};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::{Mutex, RwLock};
use tracing::{Level, event};

use crate::{
    domain::{
        constant::store,
        error::WorkflowError,
        record::{
            AssignmentRecord, Candidate, CandidateNote, CandidateStatusHistory, Client, ClientComment,
            ClientStatusHistory, StatusChangeRequest, StatusComment, UserProfile, email_key
        },
        status::EntityKind
    },
    port::storage::{ChangeSet, Mutation, Precondition, WorkflowStore}
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, clap::ValueEnum)]
pub enum StoreType {
    #[serde(rename = "inmemory")]
    #[value(name = "inmemory")]
    InMemory,
    #[serde(rename = "rocksdb")]
    #[value(name = "rocksdb")]
    RocksDb
}

impl StoreType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreType::InMemory => "inmemory",
            StoreType::RocksDb => "rocksdb"
        }
    }
}

impl std::str::FromStr for StoreType {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inmemory" => Ok(StoreType::InMemory),
            "rocksdb" => Ok(StoreType::RocksDb),
            other => Err(WorkflowError::Configuration(format!("Unknown storage backend: {}", other)))
        }
    }
}

// **********************
// Change set verification
// **********************

/// Committed state as seen from inside the commit critical section
trait Snapshot {
    fn client(&self, client_id: &str) -> Result<Option<Client>, WorkflowError>;
    fn candidate(&self, candidate_id: &str) -> Result<Option<Candidate>, WorkflowError>;
    fn request(&self, request_id: &str) -> Result<Option<StatusChangeRequest>, WorkflowError>;
    fn user(&self, user_id: &str) -> Result<Option<UserProfile>, WorkflowError>;
    /// Id of the user registered under `email`, compared by [`email_key`]
    fn email_owner(&self, email: &str) -> Result<Option<String>, WorkflowError>;
    fn has_users(&self) -> Result<bool, WorkflowError>;
    /// Whether an append mutation's row id is already taken
    fn row_exists(&self, mutation: &Mutation) -> Result<bool, WorkflowError>;
}

fn check_precondition(snapshot: &impl Snapshot, precondition: &Precondition) -> Result<(), WorkflowError> {
    match precondition {
        Precondition::ClientStatusIs { client_id, status } => {
            let client = snapshot.client(client_id)?.ok_or_else(|| WorkflowError::not_found("Client", client_id))?;
            if client.status != *status {
                return Err(WorkflowError::Conflict {
                    entity:   EntityKind::Client,
                    id:       client_id.clone(),
                    expected: status.to_string(),
                    actual:   client.status.to_string()
                });
            }
        }
        Precondition::CandidateStatusIs { candidate_id, status } => {
            let candidate =
                snapshot.candidate(candidate_id)?.ok_or_else(|| WorkflowError::not_found("Candidate", candidate_id))?;
            if candidate.status != *status {
                return Err(WorkflowError::Conflict {
                    entity:   EntityKind::Candidate,
                    id:       candidate_id.clone(),
                    expected: status.to_string(),
                    actual:   candidate.status.to_string()
                });
            }
        }
        Precondition::RequestPending { request_id } => {
            snapshot
                .request(request_id)?
                .ok_or_else(|| WorkflowError::not_found("Status change request", request_id))?
                .ensure_pending()?;
        }
        Precondition::ClientExists { client_id } => {
            snapshot.client(client_id)?.ok_or_else(|| WorkflowError::not_found("Client", client_id))?;
        }
        Precondition::CandidateExists { candidate_id } => {
            snapshot.candidate(candidate_id)?.ok_or_else(|| WorkflowError::not_found("Candidate", candidate_id))?;
        }
        Precondition::UserExists { user_id } => {
            snapshot.user(user_id)?.ok_or_else(|| WorkflowError::not_found("User", user_id))?;
        }
        Precondition::UserIs { user_id, role, status } => {
            let user = snapshot.user(user_id)?.ok_or_else(|| WorkflowError::not_found("User", user_id))?;
            if user.role != *role || user.status != *status {
                return Err(WorkflowError::UserConflict { user_id: user_id.clone() });
            }
        }
        Precondition::DirectoryEmpty => {
            if snapshot.has_users()? {
                return Err(WorkflowError::Validation("User directory is already initialised".to_string()));
            }
        }
    }
    Ok(())
}

fn check_guard(snapshot: &impl Snapshot, mutation: &Mutation) -> Result<(), WorkflowError> {
    match mutation {
        Mutation::PutRequest(request) => match snapshot.request(&request.id)? {
            Some(stored) => {
                stored.ensure_pending()?;
                let proposal = StatusChangeRequest { state: stored.state.clone(), ..request.clone() };
                if proposal != stored {
                    return Err(WorkflowError::Storage(format!(
                        "Status change request {} cannot be rewritten",
                        request.id
                    )));
                }
            }
            None if !request.state.is_pending() => {
                return Err(WorkflowError::Storage(format!(
                    "Status change request {} must be created pending",
                    request.id
                )));
            }
            None => {}
        },
        Mutation::AppendClientHistory(_)
        | Mutation::AppendCandidateHistory(_)
        | Mutation::AppendStatusComment(_)
        | Mutation::AppendClientComment(_)
        | Mutation::AppendCandidateNote(_)
        | Mutation::AppendClientAssignment(_)
        | Mutation::AppendCandidateAssignment(_) => {
            if snapshot.row_exists(mutation)? {
                return Err(WorkflowError::Storage(format!("Append-only row rejected: {}", mutation.label())));
            }
        }
        Mutation::InsertUser(user) => {
            if snapshot.user(&user.id)?.is_some() {
                return Err(WorkflowError::Validation(format!("User {} already exists", user.id)));
            }
            if snapshot.email_owner(&user.email)?.is_some() {
                return Err(WorkflowError::Validation(format!("Email already registered: {}", user.email)));
            }
        }
        Mutation::PutUser(user) => match snapshot.user(&user.id)? {
            Some(stored) if email_key(&stored.email) != email_key(&user.email) => {
                return Err(WorkflowError::Storage(format!("User {} cannot change email", user.id)));
            }
            Some(_) => {}
            None => {
                return Err(WorkflowError::Storage(format!("User {} must be registered before it is updated", user.id)));
            }
        },
        Mutation::PutClient(_) | Mutation::PutCandidate(_) | Mutation::DeleteCandidate { .. } => {}
    }
    Ok(())
}

fn verify(snapshot: &impl Snapshot, changes: &ChangeSet) -> Result<(), WorkflowError> {
    for precondition in &changes.preconditions {
        check_precondition(snapshot, precondition).inspect_err(|e| {
            event!(Level::DEBUG, event = store::PRECONDITION_FAILED, precondition = ?precondition, error = %e);
        })?;
    }
    for mutation in &changes.mutations {
        check_guard(snapshot, mutation).inspect_err(|e| {
            event!(Level::WARN, event = store::GUARD_VIOLATED, mutation = mutation.label(), error = %e);
        })?;
    }
    Ok(())
}

// **********************
// In-memory store
// **********************

#[derive(Debug, Default)]
struct Tables {
    clients:               BTreeMap<String, Client>,
    candidates:            BTreeMap<String, Candidate>,
    users:                 BTreeMap<String, UserProfile>,
    /// Insertion order doubles as request order
    requests:              Vec<StatusChangeRequest>,
    client_history:        Vec<ClientStatusHistory>,
    candidate_history:     Vec<CandidateStatusHistory>,
    status_comments:       Vec<StatusComment>,
    client_comments:       Vec<ClientComment>,
    candidate_notes:       Vec<CandidateNote>,
    client_assignments:    Vec<AssignmentRecord>,
    candidate_assignments: Vec<AssignmentRecord>
}

impl Snapshot for Tables {
    fn client(&self, client_id: &str) -> Result<Option<Client>, WorkflowError> {
        Ok(self.clients.get(client_id).cloned())
    }

    fn candidate(&self, candidate_id: &str) -> Result<Option<Candidate>, WorkflowError> {
        Ok(self.candidates.get(candidate_id).cloned())
    }

    fn request(&self, request_id: &str) -> Result<Option<StatusChangeRequest>, WorkflowError> {
        Ok(self.requests.iter().find(|r| r.id == request_id).cloned())
    }

    fn user(&self, user_id: &str) -> Result<Option<UserProfile>, WorkflowError> {
        Ok(self.users.get(user_id).cloned())
    }

    fn email_owner(&self, email: &str) -> Result<Option<String>, WorkflowError> {
        let key = email_key(email);
        Ok(self.users.values().find(|user| email_key(&user.email) == key).map(|user| user.id.clone()))
    }

    fn has_users(&self) -> Result<bool, WorkflowError> {
        Ok(!self.users.is_empty())
    }

    fn row_exists(&self, mutation: &Mutation) -> Result<bool, WorkflowError> {
        let exists = match mutation {
            Mutation::AppendClientHistory(row) => self.client_history.iter().any(|r| r.id == row.id),
            Mutation::AppendCandidateHistory(row) => self.candidate_history.iter().any(|r| r.id == row.id),
            Mutation::AppendStatusComment(row) => self.status_comments.iter().any(|r| r.id == row.id),
            Mutation::AppendClientComment(row) => self.client_comments.iter().any(|r| r.id == row.id),
            Mutation::AppendCandidateNote(row) => self.candidate_notes.iter().any(|r| r.id == row.id),
            Mutation::AppendClientAssignment(row) => self.client_assignments.iter().any(|r| r.id == row.id),
            Mutation::AppendCandidateAssignment(row) => self.candidate_assignments.iter().any(|r| r.id == row.id),
            _ => false
        };
        Ok(exists)
    }
}

impl Tables {
    fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::PutClient(client) => {
                self.clients.insert(client.id.clone(), client);
            }
            Mutation::PutCandidate(candidate) => {
                self.candidates.insert(candidate.id.clone(), candidate);
            }
            Mutation::InsertUser(user) | Mutation::PutUser(user) => {
                self.users.insert(user.id.clone(), user);
            }
            Mutation::PutRequest(request) => match self.requests.iter_mut().find(|r| r.id == request.id) {
                Some(stored) => *stored = request,
                None => self.requests.push(request)
            },
            Mutation::AppendClientHistory(row) => self.client_history.push(row),
            Mutation::AppendCandidateHistory(row) => self.candidate_history.push(row),
            Mutation::AppendStatusComment(row) => self.status_comments.push(row),
            Mutation::AppendClientComment(row) => self.client_comments.push(row),
            Mutation::AppendCandidateNote(row) => self.candidate_notes.push(row),
            Mutation::AppendClientAssignment(row) => self.client_assignments.push(row),
            Mutation::AppendCandidateAssignment(row) => self.candidate_assignments.push(row),
            Mutation::DeleteCandidate { candidate_id } => {
                self.candidates.remove(&candidate_id);
                self.candidate_history.retain(|r| r.entity_id != candidate_id);
                self.candidate_notes.retain(|r| r.candidate_id != candidate_id);
                self.candidate_assignments.retain(|r| r.entity_id != candidate_id);
            }
        }
    }
}

/// Filter rows and order them by timestamp, keeping insertion order on ties
fn chronological<T: Clone>(
    rows: &[T],
    keep: impl Fn(&T) -> bool,
    timestamp: impl Fn(&T) -> DateTime<Utc>
) -> Vec<T> {
    let mut selected: Vec<T> = rows.iter().filter(|row| keep(*row)).cloned().collect();
    selected.sort_by_key(|row| timestamp(row));
    selected
}

/// In-memory workflow store
///
/// Suitable for development and testing; data is lost when the process exits.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    tables: Arc<RwLock<Tables>>
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self { tables: Arc::new(RwLock::new(Tables::default())) }
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn commit(&self, changes: ChangeSet) -> Result<(), WorkflowError> {
        let mut tables = self.tables.write().await;
        verify(&*tables, &changes)?;

        let count = changes.mutations.len();
        for mutation in changes.mutations {
            tables.apply(mutation);
        }

        event!(Level::TRACE, event = store::CHANGESET_COMMITTED, backend = "inmemory", mutations = count);
        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<Client>, WorkflowError> {
        self.tables.read().await.client(client_id)
    }

    async fn get_candidate(&self, candidate_id: &str) -> Result<Option<Candidate>, WorkflowError> {
        self.tables.read().await.candidate(candidate_id)
    }

    async fn get_request(&self, request_id: &str) -> Result<Option<StatusChangeRequest>, WorkflowError> {
        self.tables.read().await.request(request_id)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, WorkflowError> {
        self.tables.read().await.user(user_id)
    }

    async fn list_users(&self) -> Result<Vec<UserProfile>, WorkflowError> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn get_client_history_entry(&self, history_id: &str) -> Result<Option<ClientStatusHistory>, WorkflowError> {
        Ok(self.tables.read().await.client_history.iter().find(|r| r.id == history_id).cloned())
    }

    async fn client_history(&self, client_id: &str) -> Result<Vec<ClientStatusHistory>, WorkflowError> {
        let tables = self.tables.read().await;
        Ok(chronological(&tables.client_history, |r| r.entity_id == client_id, |r| r.changed_at))
    }

    async fn candidate_history(&self, candidate_id: &str) -> Result<Vec<CandidateStatusHistory>, WorkflowError> {
        let tables = self.tables.read().await;
        Ok(chronological(&tables.candidate_history, |r| r.entity_id == candidate_id, |r| r.changed_at))
    }

    async fn client_comments(&self, client_id: &str) -> Result<Vec<ClientComment>, WorkflowError> {
        let tables = self.tables.read().await;
        Ok(chronological(&tables.client_comments, |r| r.client_id == client_id, |r| r.created_at))
    }

    async fn status_comments(&self, client_id: &str) -> Result<Vec<StatusComment>, WorkflowError> {
        let tables = self.tables.read().await;
        Ok(chronological(&tables.status_comments, |r| r.client_id == client_id, |r| r.created_at))
    }

    async fn candidate_notes(&self, candidate_id: &str) -> Result<Vec<CandidateNote>, WorkflowError> {
        let tables = self.tables.read().await;
        Ok(chronological(&tables.candidate_notes, |r| r.candidate_id == candidate_id, |r| r.created_at))
    }

    async fn client_assignments(&self, client_id: &str) -> Result<Vec<AssignmentRecord>, WorkflowError> {
        let tables = self.tables.read().await;
        Ok(chronological(&tables.client_assignments, |r| r.entity_id == client_id, |r| r.assigned_at))
    }

    async fn candidate_assignments(&self, candidate_id: &str) -> Result<Vec<AssignmentRecord>, WorkflowError> {
        let tables = self.tables.read().await;
        Ok(chronological(&tables.candidate_assignments, |r| r.entity_id == candidate_id, |r| r.assigned_at))
    }

    async fn client_requests(&self, client_id: &str) -> Result<Vec<StatusChangeRequest>, WorkflowError> {
        let tables = self.tables.read().await;
        Ok(chronological(&tables.requests, |r| r.client_id == client_id, |r| r.requested_at))
    }

    async fn pending_requests(&self) -> Result<Vec<StatusChangeRequest>, WorkflowError> {
        let tables = self.tables.read().await;
        Ok(chronological(&tables.requests, |r| r.state.is_pending(), |r| r.requested_at))
    }
}

// **********************
// RocksDB store
// **********************

/// Column family names for different record kinds
const CF_CLIENTS: &str = "clients";
const CF_CANDIDATES: &str = "candidates";
const CF_USERS: &str = "users";
const CF_REQUESTS: &str = "requests";
const CF_CLIENT_HISTORY: &str = "client_history";
const CF_CANDIDATE_HISTORY: &str = "candidate_history";
const CF_STATUS_COMMENTS: &str = "status_comments";
const CF_CLIENT_COMMENTS: &str = "client_comments";
const CF_CANDIDATE_NOTES: &str = "candidate_notes";
const CF_ASSIGNMENTS: &str = "assignments";
const CF_INDEXES: &str = "indexes";

const COLUMN_FAMILIES: &[&str] = &[
    CF_CLIENTS,
    CF_CANDIDATES,
    CF_USERS,
    CF_REQUESTS,
    CF_CLIENT_HISTORY,
    CF_CANDIDATE_HISTORY,
    CF_STATUS_COMMENTS,
    CF_CLIENT_COMMENTS,
    CF_CANDIDATE_NOTES,
    CF_ASSIGNMENTS,
    CF_INDEXES
];

const SEQUENCE_KEY: &str = "seq";

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, WorkflowError> {
    serde_json::to_vec(value).map_err(|e| WorkflowError::Serialization(format!("Failed to serialize record: {}", e)))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WorkflowError> {
    serde_json::from_slice(bytes).map_err(|e| WorkflowError::Serialization(format!("Failed to deserialize record: {}", e)))
}

/// Key for a row owned by `parent`: `{parent}:{nanos}:{sequence}`, which
/// sorts rows of one parent chronologically and by insertion on ties.
fn row_key(parent: &str, at: DateTime<Utc>, sequence: u64) -> String {
    format!("{}:{:020}:{:020}", parent, at.timestamp_nanos_opt().unwrap_or(0).max(0), sequence)
}

fn history_index_key(history_id: &str) -> String {
    format!("history:{}", history_id)
}

fn row_index_key(label: &str, row_id: &str) -> String {
    format!("row:{}:{}", label, row_id)
}

fn email_index_key(email: &str) -> String {
    format!("email:{}", email_key(email))
}

/// Id of any stored row, read without decoding the full record
#[derive(Deserialize)]
struct RowId {
    id: String
}

/// RocksDB-based workflow store
///
/// Storage layout (one column family per record kind, JSON values):
/// - `clients`, `candidates`, `users`, `requests`: `{id}`
/// - history, comments, notes: `{parent_id}:{nanos}:{sequence}`
/// - `assignments`: `{client|candidate}:{entity_id}:{nanos}:{sequence}`
/// - `indexes`: `seq`, `history:{id}` -> row key, `row:{kind}:{id}` -> row key,
///   `email:{email}` -> user id
pub struct RocksDbWorkflowStore {
    db:          Arc<DB>,
    sequence:    AtomicU64,
    commit_lock: Mutex<()>
}

impl RocksDbWorkflowStore {
    /// Open (or create) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WorkflowError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_compression_type(DBCompressionType::Snappy);

        let db = DB::open_cf(&opts, path.as_ref(), COLUMN_FAMILIES)
            .map_err(|e| WorkflowError::Storage(format!("Failed to open RocksDB: {}", e)))?;

        let opened = Self { db: Arc::new(db), sequence: AtomicU64::new(0), commit_lock: Mutex::new(()) };
        let last = opened.read_sequence()?;
        opened.sequence.store(last, Ordering::SeqCst);

        event!(Level::DEBUG, event = store::STORE_OPENED, backend = "rocksdb", path = %path.as_ref().display(), sequence = last);
        Ok(opened)
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, WorkflowError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| WorkflowError::Storage(format!("Column family '{}' not found", name)))
    }

    fn read_sequence(&self) -> Result<u64, WorkflowError> {
        match self.db.get_cf(self.cf(CF_INDEXES)?, SEQUENCE_KEY)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| WorkflowError::Storage("Corrupt sequence counter".to_string()))?;
                Ok(u64::from_be_bytes(raw))
            }
            None => Ok(0)
        }
    }

    fn get_json<T: DeserializeOwned>(&self, cf_name: &str, key: &str) -> Result<Option<T>, WorkflowError> {
        match self.db.get_cf(self.cf(cf_name)?, key.as_bytes())? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None)
        }
    }

    fn exists(&self, cf_name: &str, key: &str) -> Result<bool, WorkflowError> {
        Ok(self.db.get_cf(self.cf(cf_name)?, key.as_bytes())?.is_some())
    }

    /// Keys and values in key order starting at `prefix`, stopping at the first non-match
    fn scan(&self, cf_name: &str, prefix: &str) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>, WorkflowError> {
        let cf = self.cf(cf_name)?;
        let mode = if prefix.is_empty() {
            IteratorMode::Start
        } else {
            IteratorMode::From(prefix.as_bytes(), Direction::Forward)
        };

        let mut entries = Vec::new();
        for item in self.db.iterator_cf(cf, mode) {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            entries.push((key, value));
        }
        Ok(entries)
    }

    fn scan_json<T: DeserializeOwned>(&self, cf_name: &str, prefix: &str) -> Result<Vec<T>, WorkflowError> {
        self.scan(cf_name, prefix)?.iter().map(|(_, value)| decode(value)).collect()
    }

    fn all_requests(&self) -> Result<Vec<StatusChangeRequest>, WorkflowError> {
        let mut requests: Vec<StatusChangeRequest> = self.scan_json(CF_REQUESTS, "")?;
        requests.sort_by(|a, b| a.requested_at.cmp(&b.requested_at).then_with(|| a.id.cmp(&b.id)));
        Ok(requests)
    }

    fn stage(&self, batch: &mut WriteBatch, mutation: &Mutation, sequence: u64) -> Result<(), WorkflowError> {
        match mutation {
            Mutation::PutClient(client) => batch.put_cf(self.cf(CF_CLIENTS)?, &client.id, encode(client)?),
            Mutation::PutCandidate(candidate) => {
                batch.put_cf(self.cf(CF_CANDIDATES)?, &candidate.id, encode(candidate)?)
            }
            Mutation::InsertUser(user) | Mutation::PutUser(user) => {
                batch.put_cf(self.cf(CF_USERS)?, &user.id, encode(user)?);
                batch.put_cf(self.cf(CF_INDEXES)?, email_index_key(&user.email), &user.id);
            }
            Mutation::PutRequest(request) => batch.put_cf(self.cf(CF_REQUESTS)?, &request.id, encode(request)?),
            Mutation::AppendClientHistory(row) => {
                let key = row_key(&row.entity_id, row.changed_at, sequence);
                batch.put_cf(self.cf(CF_CLIENT_HISTORY)?, &key, encode(row)?);
                batch.put_cf(self.cf(CF_INDEXES)?, history_index_key(&row.id), &key);
            }
            Mutation::AppendCandidateHistory(row) => {
                self.stage_row(batch, CF_CANDIDATE_HISTORY, mutation, &row.id, &row.entity_id, row.changed_at, sequence, row)?
            }
            Mutation::AppendStatusComment(row) => {
                self.stage_row(batch, CF_STATUS_COMMENTS, mutation, &row.id, &row.client_id, row.created_at, sequence, row)?
            }
            Mutation::AppendClientComment(row) => {
                self.stage_row(batch, CF_CLIENT_COMMENTS, mutation, &row.id, &row.client_id, row.created_at, sequence, row)?
            }
            Mutation::AppendCandidateNote(row) => {
                self.stage_row(batch, CF_CANDIDATE_NOTES, mutation, &row.id, &row.candidate_id, row.created_at, sequence, row)?
            }
            Mutation::AppendClientAssignment(row) => {
                let parent = format!("client:{}", row.entity_id);
                self.stage_row(batch, CF_ASSIGNMENTS, mutation, &row.id, &parent, row.assigned_at, sequence, row)?
            }
            Mutation::AppendCandidateAssignment(row) => {
                let parent = format!("candidate:{}", row.entity_id);
                self.stage_row(batch, CF_ASSIGNMENTS, mutation, &row.id, &parent, row.assigned_at, sequence, row)?
            }
            Mutation::DeleteCandidate { candidate_id } => {
                batch.delete_cf(self.cf(CF_CANDIDATES)?, candidate_id);
                let owned = [
                    (CF_CANDIDATE_HISTORY, "append_candidate_history", format!("{}:", candidate_id)),
                    (CF_CANDIDATE_NOTES, "append_candidate_note", format!("{}:", candidate_id)),
                    (CF_ASSIGNMENTS, "append_candidate_assignment", format!("candidate:{}:", candidate_id))
                ];
                let indexes = self.cf(CF_INDEXES)?;
                for (cf_name, label, prefix) in owned {
                    let cf = self.cf(cf_name)?;
                    for (key, value) in self.scan(cf_name, &prefix)? {
                        let row: RowId = decode(&value)?;
                        batch.delete_cf(indexes, row_index_key(label, &row.id));
                        batch.delete_cf(cf, key);
                    }
                }
            }
        }
        Ok(())
    }

    /// Stage an append row together with its id index entry
    #[allow(clippy::too_many_arguments)]
    fn stage_row<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        mutation: &Mutation,
        row_id: &str,
        parent: &str,
        at: DateTime<Utc>,
        sequence: u64,
        row: &T
    ) -> Result<(), WorkflowError> {
        let key = row_key(parent, at, sequence);
        batch.put_cf(self.cf(cf_name)?, &key, encode(row)?);
        batch.put_cf(self.cf(CF_INDEXES)?, row_index_key(mutation.label(), row_id), &key);
        Ok(())
    }

    /// Verify and write one change set; caller holds the commit lock
    fn commit_locked(&self, changes: &ChangeSet) -> Result<(), WorkflowError> {
        verify(self, changes)?;

        let mut batch = WriteBatch::default();
        let mut sequence = self.sequence.load(Ordering::SeqCst);
        for mutation in &changes.mutations {
            sequence += 1;
            self.stage(&mut batch, mutation, sequence)?;
        }
        batch.put_cf(self.cf(CF_INDEXES)?, SEQUENCE_KEY, sequence.to_be_bytes());

        self.db.write(batch).map_err(|e| WorkflowError::Storage(format!("Failed to commit change set: {}", e)))?;
        self.sequence.store(sequence, Ordering::SeqCst);
        Ok(())
    }
}

impl Snapshot for RocksDbWorkflowStore {
    fn client(&self, client_id: &str) -> Result<Option<Client>, WorkflowError> {
        self.get_json(CF_CLIENTS, client_id)
    }

    fn candidate(&self, candidate_id: &str) -> Result<Option<Candidate>, WorkflowError> {
        self.get_json(CF_CANDIDATES, candidate_id)
    }

    fn request(&self, request_id: &str) -> Result<Option<StatusChangeRequest>, WorkflowError> {
        self.get_json(CF_REQUESTS, request_id)
    }

    fn user(&self, user_id: &str) -> Result<Option<UserProfile>, WorkflowError> {
        self.get_json(CF_USERS, user_id)
    }

    fn email_owner(&self, email: &str) -> Result<Option<String>, WorkflowError> {
        let owner = self.db.get_cf(self.cf(CF_INDEXES)?, email_index_key(email))?;
        Ok(owner.map(|id| String::from_utf8_lossy(&id).into_owned()))
    }

    fn has_users(&self) -> Result<bool, WorkflowError> {
        match self.db.iterator_cf(self.cf(CF_USERS)?, IteratorMode::Start).next() {
            Some(item) => item.map(|_| true).map_err(WorkflowError::from),
            None => Ok(false)
        }
    }

    fn row_exists(&self, mutation: &Mutation) -> Result<bool, WorkflowError> {
        let index_key = match mutation {
            Mutation::AppendClientHistory(row) => history_index_key(&row.id),
            Mutation::AppendCandidateHistory(row) => row_index_key(mutation.label(), &row.id),
            Mutation::AppendStatusComment(row) => row_index_key(mutation.label(), &row.id),
            Mutation::AppendClientComment(row) => row_index_key(mutation.label(), &row.id),
            Mutation::AppendCandidateNote(row) => row_index_key(mutation.label(), &row.id),
            Mutation::AppendClientAssignment(row) | Mutation::AppendCandidateAssignment(row) => {
                row_index_key(mutation.label(), &row.id)
            }
            _ => return Ok(false)
        };
        self.exists(CF_INDEXES, &index_key)
    }
}

#[async_trait]
impl WorkflowStore for RocksDbWorkflowStore {
    async fn commit(&self, changes: ChangeSet) -> Result<(), WorkflowError> {
        let _guard = self.commit_lock.lock().await;
        self.commit_locked(&changes).inspect_err(|e| {
            if let WorkflowError::Storage(_) | WorkflowError::Serialization(_) = e {
                event!(Level::ERROR, event = store::STORAGE_FAILED, backend = "rocksdb", error = %e);
            }
        })?;

        event!(Level::TRACE, event = store::CHANGESET_COMMITTED, backend = "rocksdb", mutations = changes.mutations.len());
        Ok(())
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<Client>, WorkflowError> {
        self.client(client_id)
    }

    async fn get_candidate(&self, candidate_id: &str) -> Result<Option<Candidate>, WorkflowError> {
        self.candidate(candidate_id)
    }

    async fn get_request(&self, request_id: &str) -> Result<Option<StatusChangeRequest>, WorkflowError> {
        self.request(request_id)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>, WorkflowError> {
        self.user(user_id)
    }

    async fn list_users(&self) -> Result<Vec<UserProfile>, WorkflowError> {
        self.scan_json(CF_USERS, "")
    }

    async fn get_client_history_entry(&self, history_id: &str) -> Result<Option<ClientStatusHistory>, WorkflowError> {
        let Some(key) = self.db.get_cf(self.cf(CF_INDEXES)?, history_index_key(history_id))? else {
            return Ok(None);
        };
        match self.db.get_cf(self.cf(CF_CLIENT_HISTORY)?, key)? {
            Some(bytes) => decode(&bytes).map(Some),
            None => Ok(None)
        }
    }

    async fn client_history(&self, client_id: &str) -> Result<Vec<ClientStatusHistory>, WorkflowError> {
        self.scan_json(CF_CLIENT_HISTORY, &format!("{}:", client_id))
    }

    async fn candidate_history(&self, candidate_id: &str) -> Result<Vec<CandidateStatusHistory>, WorkflowError> {
        self.scan_json(CF_CANDIDATE_HISTORY, &format!("{}:", candidate_id))
    }

    async fn client_comments(&self, client_id: &str) -> Result<Vec<ClientComment>, WorkflowError> {
        self.scan_json(CF_CLIENT_COMMENTS, &format!("{}:", client_id))
    }

    async fn status_comments(&self, client_id: &str) -> Result<Vec<StatusComment>, WorkflowError> {
        self.scan_json(CF_STATUS_COMMENTS, &format!("{}:", client_id))
    }

    async fn candidate_notes(&self, candidate_id: &str) -> Result<Vec<CandidateNote>, WorkflowError> {
        self.scan_json(CF_CANDIDATE_NOTES, &format!("{}:", candidate_id))
    }

    async fn client_assignments(&self, client_id: &str) -> Result<Vec<AssignmentRecord>, WorkflowError> {
        self.scan_json(CF_ASSIGNMENTS, &format!("client:{}:", client_id))
    }

    async fn candidate_assignments(&self, candidate_id: &str) -> Result<Vec<AssignmentRecord>, WorkflowError> {
        self.scan_json(CF_ASSIGNMENTS, &format!("candidate:{}:", candidate_id))
    }

    async fn client_requests(&self, client_id: &str) -> Result<Vec<StatusChangeRequest>, WorkflowError> {
        Ok(self.all_requests()?.into_iter().filter(|r| r.client_id == client_id).collect())
    }

    async fn pending_requests(&self) -> Result<Vec<StatusChangeRequest>, WorkflowError> {
        Ok(self.all_requests()?.into_iter().filter(|r| r.state.is_pending()).collect())
    }
}

/// Shared RocksDB store; the database allows a single open handle per process
static ROCKSDB_STORE: once_cell::sync::OnceCell<Arc<RocksDbWorkflowStore>> = once_cell::sync::OnceCell::new();

/// Factory for creating workflow stores based on configuration
pub struct StoreFactory;

impl StoreFactory {
    pub fn create(store_type: StoreType, db_path: Option<&Path>) -> Result<Arc<dyn WorkflowStore>, WorkflowError> {
        match store_type {
            StoreType::InMemory => Ok(Arc::new(InMemoryWorkflowStore::new())),
            StoreType::RocksDb => {
                let path = db_path
                    .ok_or_else(|| WorkflowError::Configuration("RocksDB storage requires a database path".to_string()))?;
                let store = ROCKSDB_STORE.get_or_try_init(|| RocksDbWorkflowStore::open(path).map(Arc::new))?;
                Ok(store.clone())
            }
        }
    }
}
