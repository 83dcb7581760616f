//! Infrastructure layer for Strata.
//!
//! Contains implementations of the repository traits defined in `strata-core`
//! (SQLite storage), the configuration loader, and the runtime that wires the
//! orchestrator to them.

pub mod config;
pub mod runtime;
pub mod sqlite;
