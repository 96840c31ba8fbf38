//! # hrflow
//!
//! Status and approval workflow for an HR agency's clients and candidates.
//!
//! This crate provides:
//! - Static transition tables for client and candidate lifecycles
//! - A per-action role policy (Owner, Manager, Admin)
//! - A status engine with direct apply, request/approve/reject and candidate pipeline moves
//! - An append-only status history with a merged client timeline and an approval queue
//! - In-memory and RocksDB storage behind one `WorkflowStore` port
//!
//! The engine never authenticates: callers hand it an already resolved
//! [`domain::role::Actor`] and it only authorizes.

pub mod adapter;
pub mod domain;
pub mod port;
pub mod service;
