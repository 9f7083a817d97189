//! Multi-node cluster tests.
//!
//! Exercise leader election, log replication to follower stores, leader
//! redirection, and failover.

mod common;

use common::TestCluster;
use lockmgr_core::time::now_ms;
use lockmgr_core::LockStatus;
use lockmgr_cluster::proto::lock_service_client::LockServiceClient;
use lockmgr_cluster::proto::{AcquireLockRequest, LockStatusCode};

#[tokio::test]
async fn test_leader_election() {
    let mut cluster = TestCluster::new(3).await;

    let leader = cluster
        .wait_for_leader(5_000)
        .await
        .expect("Should elect a leader");

    // Give followers time to observe the leader's heartbeats.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let leader_id = cluster.nodes[leader].node_id();
    for (i, node) in cluster.nodes.iter().enumerate() {
        assert_eq!(
            node.leader(),
            Some(leader_id),
            "Node {} should agree on leader",
            i + 1
        );
    }

    // At most one node claims leadership.
    let leaders = cluster.nodes.iter().filter(|n| n.is_leader()).count();
    assert_eq!(leaders, 1, "Exactly one leader expected");

    cluster.shutdown();
}

#[tokio::test]
async fn test_acquire_replicates_to_followers() {
    let mut cluster = TestCluster::new(3).await;
    let leader = cluster
        .wait_for_leader(5_000)
        .await
        .expect("Should elect a leader");

    let acquired = cluster.nodes[leader].acquire_lock("L1", "C1", 30_000).await;
    assert_eq!(acquired.status, LockStatus::Ok, "{}", acquired.message);

    // Wait for the commit index to reach followers via heartbeats.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    for (i, node) in cluster.nodes.iter().enumerate() {
        let lock = node
            .state_machine()
            .check("L1", now_ms())
            .unwrap_or_else(|| panic!("Node {} should have applied the acquire", i + 1));
        assert_eq!(lock.holder_client_id, "C1");
        assert_eq!(lock.fencing_token, acquired.fencing_token);
    }

    cluster.shutdown();
}

#[tokio::test]
async fn test_follower_redirects_with_leader_hint() {
    let mut cluster = TestCluster::new(3).await;
    let leader = cluster
        .wait_for_leader(5_000)
        .await
        .expect("Should elect a leader");
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let follower = (0..cluster.nodes.len())
        .find(|&i| i != leader)
        .expect("Cluster has followers");

    let reply = cluster.nodes[follower].acquire_lock("L1", "C1", 30_000).await;
    assert_eq!(reply.status, LockStatus::NotLeader);
    assert_eq!(
        reply.leader_hint,
        Some(cluster.nodes[leader].node_id()),
        "Redirect should carry the leader hint"
    );

    cluster.shutdown();
}

#[tokio::test]
async fn test_grpc_redirect_on_follower() {
    let mut cluster = TestCluster::new(3).await;
    let leader = cluster
        .wait_for_leader(5_000)
        .await
        .expect("Should elect a leader");
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let follower = (0..cluster.nodes.len())
        .find(|&i| i != leader)
        .expect("Cluster has followers");

    let mut client = LockServiceClient::connect(format!("http://{}", cluster.addresses[follower]))
        .await
        .expect("Failed to connect to follower");

    let response = client
        .acquire_lock(AcquireLockRequest {
            lock_id: "L1".to_string(),
            client_id: "C1".to_string(),
            timeout_ms: 30_000,
        })
        .await
        .expect("RPC should succeed")
        .into_inner();

    assert_eq!(response.status, LockStatusCode::NotLeader as i32);
    assert_eq!(response.leader_hint, cluster.nodes[leader].node_id());

    cluster.shutdown();
}

#[tokio::test]
async fn test_grpc_acquire_on_leader() {
    let mut cluster = TestCluster::new(3).await;
    let leader = cluster
        .wait_for_leader(5_000)
        .await
        .expect("Should elect a leader");

    let mut client = LockServiceClient::connect(format!("http://{}", cluster.addresses[leader]))
        .await
        .expect("Failed to connect to leader");

    let response = client
        .acquire_lock(AcquireLockRequest {
            lock_id: "L1".to_string(),
            client_id: "C1".to_string(),
            timeout_ms: 30_000,
        })
        .await
        .expect("RPC should succeed")
        .into_inner();

    assert_eq!(response.status, LockStatusCode::Ok as i32);
    assert!(response.fencing_token > 0);
    assert!(response.expires_at > now_ms());

    cluster.shutdown();
}

#[tokio::test]
async fn test_failover_preserves_committed_locks() {
    let mut cluster = TestCluster::new(3).await;
    let old_leader = cluster
        .wait_for_leader(5_000)
        .await
        .expect("Should elect a leader");
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    let acquired = cluster.nodes[old_leader].acquire_lock("L1", "C1", 60_000).await;
    assert_eq!(acquired.status, LockStatus::Ok);
    let old_term = cluster.nodes[old_leader].current_term();

    // Let the commit reach the followers, then kill the leader.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    cluster.nodes[old_leader].shutdown();

    let new_leader = cluster
        .wait_for_leader_excluding(old_leader, 10_000)
        .await
        .expect("Remaining nodes should elect a new leader");
    assert_ne!(new_leader, old_leader);
    assert!(
        cluster.nodes[new_leader].current_term() > old_term,
        "Failover must advance the term"
    );

    // Give the new leader's NOOP a moment to commit the old entries.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let checked = cluster.nodes[new_leader].check_lock("L1");
    assert_eq!(checked.status, LockStatus::Ok, "Lock must survive failover");
    let holder = checked.holder.expect("Holder should be present");
    assert_eq!(holder.holder_client_id, "C1");
    assert_eq!(holder.fencing_token, acquired.fencing_token);

    // The new leader keeps issuing strictly increasing tokens.
    let released = cluster.nodes[new_leader]
        .release_lock("L1", "C1", acquired.fencing_token)
        .await;
    assert_eq!(released.status, LockStatus::Ok);

    let reacquired = cluster.nodes[new_leader].acquire_lock("L1", "C2", 30_000).await;
    assert_eq!(reacquired.status, LockStatus::Ok);
    assert!(
        reacquired.fencing_token > acquired.fencing_token,
        "Token monotonicity must hold across failover"
    );

    cluster.shutdown();
}
