//! Network layer for Raft RPC communication.
//!
//! This module implements the gRPC-based transport for Raft messages using
//! tonic. Payloads are serde_json-encoded structs carried in opaque bytes.

mod client;
mod server;

pub use client::NetworkClient;
pub use server::RaftServer;
