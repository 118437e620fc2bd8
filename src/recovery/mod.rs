/// Recovery of failed members through forced redeployment
///
/// Every member belongs to a redeploy group named from the service prefix and
/// its role (`{prefix}MasterService` or `{prefix}SlaveService` by default).
/// Recovery is best effort: control plane errors are logged and never reach
/// the request that triggered them.
pub mod ecs;

use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

use crate::config::RecoveryConfig;
use crate::core::{ClusterTopology, Endpoint, NodeRole};
use crate::error::GatewayResult;

/// What the control plane is asked to redeploy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryTarget {
    pub member: Endpoint,
    pub cluster: String,
    pub redeploy_group: String,
}

/// Forces a fresh deployment of a redeploy group
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn force_redeploy(&self, target: &RecoveryTarget) -> GatewayResult<()>;
}

/// Control plane used when recovery is switched off
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledControlPlane;

#[async_trait]
impl ControlPlane for DisabledControlPlane {
    async fn force_redeploy(&self, target: &RecoveryTarget) -> GatewayResult<()> {
        tracing::warn!(
            member = %target.member,
            group = %target.redeploy_group,
            "Recovery disabled, not redeploying"
        );
        Ok(())
    }
}

/// Maps members to their redeploy group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub cluster: String,
    pub service_name_prefix: String,
    pub master_group_suffix: String,
    pub replica_group_suffix: String,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            cluster: String::new(),
            service_name_prefix: String::new(),
            master_group_suffix: "MasterService".to_string(),
            replica_group_suffix: "SlaveService".to_string(),
        }
    }
}

impl RecoveryPolicy {
    pub fn from_config(config: &RecoveryConfig) -> Self {
        match config {
            RecoveryConfig::Ecs {
                cluster,
                service_name_prefix,
                master_group_suffix,
                replica_group_suffix,
                ..
            } => Self {
                cluster: cluster.clone(),
                service_name_prefix: service_name_prefix.clone(),
                master_group_suffix: master_group_suffix.clone(),
                replica_group_suffix: replica_group_suffix.clone(),
            },
            RecoveryConfig::Disabled => Self::default(),
        }
    }

    pub fn group_for(&self, role: NodeRole) -> String {
        let suffix = match role {
            NodeRole::Master => &self.master_group_suffix,
            NodeRole::Replica => &self.replica_group_suffix,
        };
        format!("{}{}", self.service_name_prefix, suffix)
    }

    pub fn target_for(&self, member: &Endpoint) -> RecoveryTarget {
        RecoveryTarget {
            member: member.clone(),
            cluster: self.cluster.clone(),
            redeploy_group: self.group_for(member.role()),
        }
    }
}

/// How much of the cluster a failure caused to be redeployed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryScope {
    Member,
    Cluster,
}

pub struct RecoveryController {
    control_plane: Arc<dyn ControlPlane>,
    policy: RecoveryPolicy,
}

impl RecoveryController {
    pub fn new(control_plane: Arc<dyn ControlPlane>, policy: RecoveryPolicy) -> Self {
        Self {
            control_plane,
            policy,
        }
    }

    /// Redeploy the group of one member
    pub async fn recover(&self, member: &Endpoint) {
        let target = self.policy.target_for(member);
        tracing::info!(
            member = %member,
            cluster = %target.cluster,
            group = %target.redeploy_group,
            "Restarting node"
        );

        match self.control_plane.force_redeploy(&target).await {
            Ok(()) => tracing::info!(group = %target.redeploy_group, "Redeployment triggered"),
            Err(e) => tracing::error!(
                member = %member,
                group = %target.redeploy_group,
                error = %e,
                "Failed to restart node"
            ),
        }
    }

    /// Redeploy every member concurrently: the master and all replicas
    pub async fn recover_cluster(&self, topology: &ClusterTopology) {
        tracing::warn!(members = topology.member_count(), "Restarting entire cluster");
        join_all(topology.members().map(|member| self.recover(member))).await;
    }

    /// A failed master takes the whole cluster down with it; a failed replica
    /// is redeployed alone.
    pub async fn recover_after_failure(
        &self,
        failed: &Endpoint,
        topology: &ClusterTopology,
    ) -> RecoveryScope {
        match failed.role() {
            NodeRole::Master => {
                self.recover_cluster(topology).await;
                RecoveryScope::Cluster
            }
            NodeRole::Replica => {
                self.recover(failed).await;
                RecoveryScope::Member
            }
        }
    }
}
