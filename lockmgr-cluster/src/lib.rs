//! Distributed lock manager cluster: Raft consensus, the replicated lock
//! store, and the client-facing lock service.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Region (Raft group)                      │
//! │                                                              │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │   Node 1    │   │   Node 2    │   │   Node 3    │         │
//! │  │  (Leader)   │   │ (Follower)  │   │ (Follower)  │         │
//! │  │             │   │             │   │             │         │
//! │  │ ┌─────────┐ │   │ ┌─────────┐ │   │ ┌─────────┐ │         │
//! │  │ │  Raft   │◄┼───┼─┤  Raft   │◄┼───┼─┤  Raft   │ │         │
//! │  │ │  Node   │ │   │ │  Node   │ │   │ │  Node   │ │         │
//! │  │ └────┬────┘ │   │ └────┬────┘ │   │ └────┬────┘ │         │
//! │  │      │      │   │      │      │   │      │      │         │
//! │  │ ┌────▼────┐ │   │ ┌────▼────┐ │   │ ┌────▼────┐ │         │
//! │  │ │  Lock   │ │   │ │  Lock   │ │   │ │  Lock   │ │         │
//! │  │ │  Store  │ │   │ │  Store  │ │   │ │  Store  │ │         │
//! │  │ └─────────┘ │   │ └─────────┘ │   │ └─────────┘ │         │
//! │  └──────┬──────┘   └─────────────┘   └─────────────┘         │
//! │         │ cross-region quorum                                │
//! └─────────┼────────────────────────────────────────────────────┘
//!           ▼
//!     other regional leaders
//! ```
//!
//! Writes flow client → front-end → leader proposal → replication →
//! majority commit → applier → reply. The leader hands out a fencing token
//! with every successful acquisition; downstream resources use it to fence
//! off stale holders.
//!
//! # Usage
//!
//! ```ignore
//! use lockmgr_cluster::{ClusterConfig, LockNode};
//!
//! let config = ClusterConfig::builder()
//!     .node_id(1)
//!     .listen_addr("127.0.0.1:5000")
//!     .peers(vec![
//!         (2, "127.0.0.1:5001".to_string()),
//!         (3, "127.0.0.1:5002".to_string()),
//!     ])
//!     .build()?;
//!
//! let node = LockNode::start(config).await?;
//! let reply = node.acquire_lock("orders/1042", "worker-7", 30_000).await;
//! ```

pub mod config;
pub mod error;
pub mod log;
pub mod network;
pub mod node;
pub mod raft;
pub mod region;
pub mod service;
pub mod state;
pub mod types;

// Re-export main types
pub use config::ClusterConfig;
pub use error::{ClusterError, ClusterResult};
pub use node::LockNode;
pub use service::{AcquireReply, CheckReply, ExtendReply, LockFrontend, ReleaseReply};
pub use state::{ApplyOutcome, LockStateMachine};
pub use types::NodeId;

// Generated protobuf code
pub mod proto {
    tonic::include_proto!("lockmgr.cluster");
}
