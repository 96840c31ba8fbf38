//! Structured event names for internal monitoring and debugging

/// Status engine events
pub mod engine {
    pub const COMMAND_RECEIVED: &str = "command.received";
    pub const COMMAND_REJECTED: &str = "command.rejected";
    pub const COMMAND_COMMITTED: &str = "command.committed";
    pub const COMMAND_FAILED: &str = "command.failed";
    pub const PROJECTION_READ: &str = "projection.read";
    pub const USER_REGISTERED: &str = "user.registered";
    pub const USER_STATUS_CHANGED: &str = "user.status_changed";
}

/// Workflow store events
pub mod store {
    pub const STORE_OPENED: &str = "store.opened";
    pub const CHANGESET_COMMITTED: &str = "changeset.committed";
    pub const PRECONDITION_FAILED: &str = "changeset.precondition_failed";
    pub const GUARD_VIOLATED: &str = "changeset.guard_violated";
    pub const STORAGE_FAILED: &str = "storage.failed";
}

/// Configuration events
pub mod config {
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULTED: &str = "config.defaulted";
    pub const CONFIG_SAVED: &str = "config.saved";
}
