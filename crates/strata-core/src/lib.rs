//! Workflow engine and repository trait definitions for Strata.
//!
//! This crate defines the "ports" (repository and step executor traits) that
//! adapters implement, and the engine built on top of them. It depends only
//! on `strata-types` -- never on `strata-infra` or any database crate.

pub mod event;
pub mod repository;
pub mod workflow;
