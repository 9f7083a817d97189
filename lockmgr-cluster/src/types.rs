//! Shared type aliases for the cluster.

/// Node ID type within a region.
///
/// Each node in a regional Raft group has a unique 64-bit identifier.
pub type NodeId = u64;

/// Raft term - a monotonically increasing leadership epoch.
pub type Term = u64;

/// 1-based position in the Raft log.
pub type LogIndex = u64;
