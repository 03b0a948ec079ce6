//! Application layer orchestrating the payment saga.
//!
//! [`engine::SagaEngine`] is the entry point. Every component works on a
//! shared [`context::SagaContext`], serialises work per request id through
//! [`locks::KeyedLocks`], and commits with optimistic versioning so a racing
//! writer can never move a finished payment.

pub mod aggregator;
pub mod context;
pub mod engine;
pub mod inbox;
pub mod locks;
pub mod settlement;
pub mod submission;
pub mod sweeper;
