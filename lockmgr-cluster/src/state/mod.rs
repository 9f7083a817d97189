//! Raft state machine for the replicated lock store.
//!
//! The state machine receives committed log entries and applies them to the
//! lock store. All nodes apply the same entries in the same order, so every
//! node's store converges to the same state (up to lazy expiry).

mod machine;

pub use machine::{ApplyOutcome, LockStateMachine};
