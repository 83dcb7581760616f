//! Execution event distribution.
//!
//! `EventBus` fans `ExecutionEvent`s out to live subscribers over a
//! `tokio::sync::broadcast` channel; `EventRecorder` persists each event
//! through the repository before publishing it.

pub mod bus;
pub mod recorder;

pub use bus::EventBus;
pub use recorder::EventRecorder;
