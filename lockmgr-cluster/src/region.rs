//! Proposer-side cross-region coordination.
//!
//! A successful local acquire is confirmed only after a strict majority of
//! regional leaders (the local region included) agree there is no
//! conflicting holder. The exchange is two-phase over stateless RPCs: a
//! vote fan-out, then best-effort COMMIT/ABORT notifications. State for an
//! in-flight acquisition lives on the proposer's stack for the duration of
//! the call.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::Channel;

use crate::error::{ClusterError, ClusterResult};
use crate::proto::region_service_client::RegionServiceClient;
use crate::proto::{CrossRegionDecision, CrossRegionProposal, RegionDecision, RegionVote};

/// Client-side coordinator talking to the other regions' leaders.
pub struct RegionCoordinator {
    /// The local region's name, sent as the origin of every proposal.
    region_id: String,
    /// Other regional leaders: region_id -> address.
    peers: HashMap<String, String>,
    /// Cached connections per region.
    connections: RwLock<HashMap<String, Channel>>,
    /// Per-RPC deadline for votes and notifications.
    rpc_timeout: Duration,
}

impl RegionCoordinator {
    pub fn new(
        region_id: impl Into<String>,
        peers: HashMap<String, String>,
        rpc_timeout: Duration,
    ) -> Self {
        Self {
            region_id: region_id.into(),
            peers,
            connections: RwLock::new(HashMap::new()),
            rpc_timeout,
        }
    }

    /// Run the cross-region quorum for a locally committed acquisition.
    ///
    /// Returns `Ok(())` once a strict majority of regions (including this
    /// one) voted yes; the yes-voters are then told to record the holder as
    /// an advisory entry. On a failed quorum the yes-voters are told to
    /// abort and the caller must issue a compensating release.
    pub async fn confirm_acquisition(
        self: &Arc<Self>,
        lock_id: &str,
        holder_client_id: &str,
        fencing_token: u64,
        expires_at: u64,
    ) -> ClusterResult<()> {
        let proposal = CrossRegionProposal {
            lock_id: lock_id.to_string(),
            holder_client_id: holder_client_id.to_string(),
            origin_region: self.region_id.clone(),
            fencing_token,
            expires_at,
        };

        let mut handles = Vec::with_capacity(self.peers.len());
        for (region, addr) in &self.peers {
            let this = Arc::clone(self);
            let region = region.clone();
            let addr = addr.clone();
            let proposal = proposal.clone();
            handles.push(tokio::spawn(async move {
                let vote = this.propose_to(&region, &addr, proposal).await;
                (region, vote)
            }));
        }

        // The local region's own committed acquire counts as one yes.
        let total = self.peers.len() + 1;
        let needed = total / 2 + 1;
        let mut yes_regions = Vec::new();

        for handle in handles {
            let Ok((region, result)) = handle.await else {
                continue;
            };
            match result {
                Ok(RegionVote::Yes) => yes_regions.push(region),
                Ok(RegionVote::Conflict) => {
                    tracing::warn!(lock_id, region = %region, "cross-region vote reported conflict");
                }
                Ok(RegionVote::No) => {
                    tracing::debug!(lock_id, region = %region, "cross-region vote denied");
                }
                Err(e) => {
                    tracing::debug!(lock_id, region = %region, error = %e, "cross-region vote failed");
                }
            }
        }

        let confirmed = yes_regions.len() + 1;
        if confirmed >= needed {
            self.notify(yes_regions, lock_id, fencing_token, RegionDecision::Commit);
            Ok(())
        } else {
            self.notify(yes_regions, lock_id, fencing_token, RegionDecision::Abort);
            Err(ClusterError::QuorumFailed { confirmed, needed })
        }
    }

    /// Best-effort fan-out after a local release, telling every region to
    /// drop its advisory entry. Failures are logged, never surfaced: the
    /// lock is already free locally and will expire elsewhere.
    pub fn release_fanout(self: &Arc<Self>, lock_id: &str, fencing_token: u64) {
        let regions = self.peers.keys().cloned().collect();
        self.notify(regions, lock_id, fencing_token, RegionDecision::Abort);
    }

    fn notify(
        self: &Arc<Self>,
        regions: Vec<String>,
        lock_id: &str,
        fencing_token: u64,
        decision: RegionDecision,
    ) {
        let message = CrossRegionDecision {
            lock_id: lock_id.to_string(),
            fencing_token,
            decision: decision as i32,
        };
        for region in regions {
            let Some(addr) = self.peers.get(&region).cloned() else {
                continue;
            };
            let this = Arc::clone(self);
            let message = message.clone();
            tokio::spawn(async move {
                if let Err(e) = this.send_decision(&region, &addr, message).await {
                    tracing::debug!(region = %region, error = %e, "cross-region decision failed");
                }
            });
        }
    }

    async fn propose_to(
        &self,
        region: &str,
        addr: &str,
        proposal: CrossRegionProposal,
    ) -> ClusterResult<RegionVote> {
        let fut = async {
            let channel = self.get_connection(region, addr).await?;
            let mut client = RegionServiceClient::new(channel);
            let reply = client.propose_cross_region(proposal).await?.into_inner();
            Ok(RegionVote::try_from(reply.vote).unwrap_or(RegionVote::No))
        };
        tokio::time::timeout(self.rpc_timeout, fut)
            .await
            .map_err(|_| ClusterError::RpcTimeout {
                target: region.to_string(),
            })?
    }

    async fn send_decision(
        &self,
        region: &str,
        addr: &str,
        decision: CrossRegionDecision,
    ) -> ClusterResult<()> {
        let fut = async {
            let channel = self.get_connection(region, addr).await?;
            let mut client = RegionServiceClient::new(channel);
            client.confirm_cross_region(decision).await?;
            Ok(())
        };
        tokio::time::timeout(self.rpc_timeout, fut)
            .await
            .map_err(|_| ClusterError::RpcTimeout {
                target: region.to_string(),
            })?
    }

    async fn get_connection(&self, region: &str, addr: &str) -> ClusterResult<Channel> {
        {
            let connections = self.connections.read();
            if let Some(channel) = connections.get(region) {
                return Ok(channel.clone());
            }
        }

        let endpoint = format!("http://{}", addr);
        let channel = Channel::from_shared(endpoint)
            .map_err(|e| ClusterError::Config(e.to_string()))?
            .connect()
            .await?;

        {
            let mut connections = self.connections.write();
            connections.insert(region.to_string(), channel.clone());
        }

        Ok(channel)
    }
}
