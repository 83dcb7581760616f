//! Shared domain types for Strata.
//!
//! This crate contains the domain types used across the orchestrator:
//! workflow definitions, execution records, checkpoints, events, and the
//! configuration and repository error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod workflow;
