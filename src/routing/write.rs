/// Write path: master first, replicas in the background
use futures::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::core::backend::BackendClient;
use crate::core::{BackendResponse, ClusterTopology, ProxyRequest};
use crate::error::GatewayResult;
use crate::recovery::RecoveryController;

/// Tally of one background replication round
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationReport {
    /// Replicas that answered 2xx
    pub replicated: usize,
    /// Replicas that answered with any other status
    pub rejected: usize,
    /// Replicas that could not be reached; each one was sent to recovery
    pub unreachable: usize,
}

/// Master response plus the handle of the replication it started, if any.
///
/// Dropping the handle detaches the replication; it still runs to completion.
#[derive(Debug)]
pub struct WriteOutcome {
    pub response: BackendResponse,
    pub replication: Option<JoinHandle<ReplicationReport>>,
}

pub struct WriteCoordinator {
    client: Arc<dyn BackendClient>,
    recovery: Arc<RecoveryController>,
}

impl WriteCoordinator {
    pub fn new(client: Arc<dyn BackendClient>, recovery: Arc<RecoveryController>) -> Self {
        Self { client, recovery }
    }

    /// Forward a write to the master and return its response as-is.
    ///
    /// A 2xx master response schedules replication to every replica without
    /// waiting for it. A transport failure on the master redeploys the whole
    /// cluster before the failure is returned.
    pub async fn handle_write(
        &self,
        topology: Arc<ClusterTopology>,
        request: Arc<ProxyRequest>,
    ) -> GatewayResult<WriteOutcome> {
        let master = topology.master();

        let response = match self.client.forward(master, &request).await {
            Ok(response) => response,
            Err(failure) => {
                log::error!("Write to master {} failed: {}", master.address(), failure.reason);
                self.recovery.recover_cluster(&topology).await;
                return Err(failure.into());
            }
        };

        let replication = if response.is_success() && !topology.replicas().is_empty() {
            log::debug!(
                "Master accepted write ({}), replicating to {} replicas",
                response.status,
                topology.replicas().len()
            );
            Some(self.spawn_replication(topology, request))
        } else {
            None
        };

        Ok(WriteOutcome {
            response,
            replication,
        })
    }

    fn spawn_replication(
        &self,
        topology: Arc<ClusterTopology>,
        request: Arc<ProxyRequest>,
    ) -> JoinHandle<ReplicationReport> {
        let client = Arc::clone(&self.client);
        let recovery = Arc::clone(&self.recovery);
        tokio::spawn(async move { replicate(client, recovery, topology, request).await })
    }
}

enum ReplicaOutcome {
    Replicated,
    Rejected,
    Unreachable,
}

async fn replicate(
    client: Arc<dyn BackendClient>,
    recovery: Arc<RecoveryController>,
    topology: Arc<ClusterTopology>,
    request: Arc<ProxyRequest>,
) -> ReplicationReport {
    let attempts = topology.replicas().iter().map(|replica| {
        let client = &client;
        let recovery = &recovery;
        let request = &request;
        async move {
            match client.forward(replica, request).await {
                Ok(response) if response.is_success() => ReplicaOutcome::Replicated,
                Ok(response) => {
                    log::warn!(
                        "Replica {} rejected replicated write with {}",
                        replica.address(),
                        response.status
                    );
                    ReplicaOutcome::Rejected
                }
                Err(failure) => {
                    log::warn!(
                        "Replication to {} failed: {}",
                        replica.address(),
                        failure.reason
                    );
                    recovery.recover(replica).await;
                    ReplicaOutcome::Unreachable
                }
            }
        }
    });

    let mut report = ReplicationReport::default();
    for outcome in join_all(attempts).await {
        match outcome {
            ReplicaOutcome::Replicated => report.replicated += 1,
            ReplicaOutcome::Rejected => report.rejected += 1,
            ReplicaOutcome::Unreachable => report.unreachable += 1,
        }
    }

    log::info!(
        "Replication finished: {} replicated, {} rejected, {} unreachable",
        report.replicated,
        report.rejected,
        report.unreachable
    );
    report
}
