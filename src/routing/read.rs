/// Read path: fan out to every member, first reply wins
use std::sync::Arc;

use super::race::first_success;
use crate::core::backend::BackendClient;
use crate::core::{BackendResponse, ClusterTopology, ProxyRequest};
use crate::error::{GatewayError, GatewayResult};
use crate::recovery::RecoveryController;

pub struct ReadCoordinator {
    client: Arc<dyn BackendClient>,
    recovery: Arc<RecoveryController>,
}

impl ReadCoordinator {
    pub fn new(client: Arc<dyn BackendClient>, recovery: Arc<RecoveryController>) -> Self {
        Self { client, recovery }
    }

    /// Send the request to the master and every replica at once and return
    /// the first HTTP reply, whatever its status.
    ///
    /// Every member that fails at the transport level is sent to recovery,
    /// including members whose failure arrives after a winner was chosen.
    pub async fn handle_read(
        &self,
        topology: Arc<ClusterTopology>,
        request: Arc<ProxyRequest>,
    ) -> GatewayResult<BackendResponse> {
        let members: Vec<_> = topology.members().cloned().collect();

        let branches = members.into_iter().map(|member| {
            let client = Arc::clone(&self.client);
            let recovery = Arc::clone(&self.recovery);
            let topology = Arc::clone(&topology);
            let request = Arc::clone(&request);
            async move {
                match client.forward(&member, &request).await {
                    Ok(response) => {
                        log::debug!("Read answered by {} ({})", member, response.status);
                        Ok(response)
                    }
                    Err(failure) => {
                        log::warn!("Error reading from node {}: {}", member, failure.reason);
                        recovery.recover_after_failure(&member, &topology).await;
                        Err(failure)
                    }
                }
            }
        });

        first_success(branches).await.map_err(|failures| {
            log::error!("All {} read attempts failed", failures.len());
            GatewayError::AllNodesFailed { failures }
        })
    }
}
