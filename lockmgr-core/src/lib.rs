//! Core lock domain model for the lockmgr distributed lock manager.
//!
//! This crate holds the pieces of the system that are pure data and pure
//! logic: the lock record, the lock store that the replicated state machine
//! mutates, the status vocabulary shared by every response, and the lock
//! timeout policy. There is no I/O and no concurrency here - the store is
//! mutated by exactly one caller (the state machine applier in
//! `lockmgr-cluster`), so all synchronization lives with the caller.

pub mod config;
pub mod lock;
pub mod status;
pub mod store;
pub mod time;

pub use config::LockConfig;
pub use lock::Lock;
pub use status::LockStatus;
pub use store::{AcquireOutcome, ExtendOutcome, LockStore, ReleaseOutcome};
