/// Amazon ECS as the control plane: `UpdateService` with a forced new deployment
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ecs::error::DisplayErrorContext;
use aws_sdk_ecs::Client;

use super::{ControlPlane, RecoveryTarget};
use crate::error::{GatewayError, GatewayResult};

pub struct EcsControlPlane {
    client: Client,
}

impl EcsControlPlane {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn from_env(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let config = loader.load().await;
        Self::new(Client::new(&config))
    }
}

#[async_trait]
impl ControlPlane for EcsControlPlane {
    async fn force_redeploy(&self, target: &RecoveryTarget) -> GatewayResult<()> {
        let output = self
            .client
            .update_service()
            .cluster(&target.cluster)
            .service(&target.redeploy_group)
            .force_new_deployment(true)
            .send()
            .await
            .map_err(|e| {
                GatewayError::recovery(format!(
                    "UpdateService {} in cluster {} failed: {}",
                    target.redeploy_group,
                    target.cluster,
                    DisplayErrorContext(e)
                ))
            })?;

        tracing::debug!(
            service = ?output.service().and_then(|s| s.service_arn()),
            "UpdateService accepted"
        );
        Ok(())
    }
}
