//! Shared types for the request-dispatch worker pool.
//!
//! This crate has no scheduling logic of its own -- it defines the request
//! model, the error kinds, the trigger/observability surface, and a small
//! rate-limiter that every other crate in the workspace builds on.

pub mod error;
pub mod ratelimit;
pub mod request;
pub mod trigger;

pub use error::PoolError;
pub use request::{Action, ChildState, MasterState, Request, RequestHandle};
pub use trigger::{NullSink, RecordingSink, Trigger, TriggerSink};
