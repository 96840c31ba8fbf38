//! Base command trait that all mutating engine operations implement
//!
//! Every command follows the same lifecycle, driven by the engine:
//! 1. Authorize - Check the actor's role against the permission table
//! 2. Load - Read the current records the command depends on
//! 3. Validate - Check existence, ownership and transition rules
//! 4. Emit - Produce the change set and the value returned to the caller
//!
//! The engine then commits the change set. Nothing is written before
//! validation passes, so a failed command leaves storage untouched.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    domain::error::WorkflowError,
    port::storage::{ChangeSet, WorkflowStore}
};

#[async_trait]
pub trait Command: Debug + Send + Sync {
    /// Records read during the load phase
    type Loaded: Send + Sync;

    /// Value handed back once the change set is committed
    type Output: Send;

    /// Phase 1: reject callers whose role lacks the permission
    fn authorize(&self) -> Result<(), WorkflowError>;

    /// Phase 2: load current state
    async fn load(&self, store: &dyn WorkflowStore) -> Result<Self::Loaded, WorkflowError>;

    /// Phase 3: validate the request against the loaded state
    fn validate(&self, loaded: &Self::Loaded) -> Result<(), WorkflowError>;

    /// Phase 4: build the atomic unit of work
    fn emit(&self, loaded: Self::Loaded, now: DateTime<Utc>) -> Result<(ChangeSet, Self::Output), WorkflowError>;

    /// Get a human-readable name for this command (for logging/debugging)
    fn name(&self) -> &'static str;

    /// Id of the entity the command acts on, if it already exists
    fn target_id(&self) -> Option<&str> {
        None
    }
}
