//! Error types for cluster operations.

use crate::types::NodeId;
use thiserror::Error;

/// Result type for cluster operations.
pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

/// Errors that can occur in cluster operations.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Network/RPC error.
    #[error("Network error: {0}")]
    Network(#[from] tonic::Status),

    /// Transport error.
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// RPC did not complete within its deadline.
    #[error("RPC to {target} timed out")]
    RpcTimeout {
        /// Peer that did not answer in time.
        target: String,
    },

    /// Not the leader - includes leader hint if known.
    #[error("Not the leader, leader is node {leader:?}")]
    NotLeader {
        /// The current leader if known.
        leader: Option<NodeId>,
    },

    /// Cross-region quorum could not be reached.
    #[error("Cross-region quorum failed: {confirmed}/{needed} regions confirmed")]
    QuorumFailed {
        /// Regions that voted yes, including the local one.
        confirmed: usize,
        /// Strict majority threshold.
        needed: usize,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ClusterError {
    fn from(e: serde_json::Error) -> Self {
        ClusterError::Serialization(e.to_string())
    }
}
