/// Triplegate - read/write splitting gateway for a replicated RDF triple-store cluster
///
/// One master accepts writes; replicas receive a copy of every successful
/// write in the background. Reads are sent to every member at once and the
/// first reply wins. Members are discovered from a service registry (AWS
/// Cloud Map) or configured statically, and members that stop answering are
/// redeployed through the control plane (Amazon ECS).
pub mod config;
pub mod core;
pub mod discovery;
pub mod error;
pub mod health;
pub mod recovery;
pub mod routing;
pub mod server;
pub mod utils;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::config::{Config, DiscoveryConfig, RecoveryConfig};
use crate::core::backend::{BackendClient, HttpBackendClient};
use crate::discovery::cloudmap::CloudMapRegistry;
use crate::discovery::static_nodes::StaticTopology;
use crate::discovery::{RegistryDiscovery, TopologyCache, TopologySource};
use crate::error::GatewayResult;
use crate::recovery::ecs::EcsControlPlane;
use crate::recovery::{ControlPlane, DisabledControlPlane, RecoveryController, RecoveryPolicy};
use crate::routing::{Router, RouterOptions};

/// Assembled gateway: configuration plus the router built from it
pub struct Gateway {
    config: Config,
    router: Arc<Router>,
}

impl Gateway {
    /// Build every collaborator the configuration asks for
    pub async fn from_config(config: Config) -> GatewayResult<Self> {
        let source: Arc<dyn TopologySource> = match &config.discovery {
            DiscoveryConfig::CloudMap {
                namespace,
                master_service,
                app_port,
                scheme,
                region,
            } => {
                log::info!("Discovering members from Cloud Map namespace {}", namespace);
                let registry = CloudMapRegistry::from_env(region.clone()).await;
                Arc::new(RegistryDiscovery::new(
                    registry,
                    namespace.clone(),
                    master_service.clone(),
                    scheme.clone(),
                    *app_port,
                ))
            }
            DiscoveryConfig::Static { master, replicas } => {
                log::info!("Using static topology: master {} and {} replicas", master, replicas.len());
                Arc::new(StaticTopology::new(master, replicas)?)
            }
        };

        let control_plane: Arc<dyn ControlPlane> = match &config.recovery {
            RecoveryConfig::Ecs {
                cluster, region, ..
            } => {
                log::info!("Recovery through ECS cluster {}", cluster);
                Arc::new(EcsControlPlane::from_env(region.clone()).await)
            }
            RecoveryConfig::Disabled => {
                log::warn!("Recovery disabled; failed members will not be redeployed");
                Arc::new(DisabledControlPlane)
            }
        };

        let client: Arc<dyn BackendClient> = Arc::new(HttpBackendClient::from_config(&config.backend)?);
        let recovery = Arc::new(RecoveryController::new(
            control_plane,
            RecoveryPolicy::from_config(&config.recovery),
        ));
        let topology = TopologyCache::new(source, config.cache_ttl());
        let router = Router::new(topology, client, recovery, RouterOptions::from_config(&config));

        Ok(Self {
            config,
            router: Arc::new(router),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn router(&self) -> Arc<Router> {
        Arc::clone(&self.router)
    }

    /// Serve HTTP on the configured listen address
    pub async fn run(self) -> GatewayResult<()> {
        server::serve(&self.config.server, self.router).await
    }
}
