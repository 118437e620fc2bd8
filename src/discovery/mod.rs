/// Cluster membership discovery and the time-bounded topology cache
///
/// A `TopologySource` resolves the current master and replicas. The
/// `TopologyCache` in front of it answers from memory while the last
/// resolution is younger than its TTL and goes back to the source otherwise.
pub mod cloudmap;
pub mod static_nodes;

use async_trait::async_trait;
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::core::{ClusterTopology, Endpoint, NodeRole};
use crate::error::{GatewayError, GatewayResult};

/// Time source for cache freshness
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Monotonic wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Members returned by one resolution, before the cache stamps them
#[derive(Debug, Clone, PartialEq)]
pub struct Membership {
    pub master: Endpoint,
    pub replicas: Vec<Endpoint>,
}

/// Resolves the current cluster membership
#[async_trait]
pub trait TopologySource: Send + Sync {
    async fn resolve(&self) -> GatewayResult<Membership>;
}

/// The three registry queries discovery needs
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Id of the namespace called `name`, `None` when no such namespace exists
    async fn namespace_id(&self, name: &str) -> GatewayResult<Option<String>>;

    /// Names of every service registered in the namespace
    async fn service_names(&self, namespace_id: &str) -> GatewayResult<Vec<String>>;

    /// Addresses (IPv4) of the healthy instances of one service
    async fn instance_addresses(&self, namespace: &str, service: &str) -> GatewayResult<Vec<String>>;
}

/// Discovery against a service registry.
///
/// The service named `master_service` holds the master (its first instance);
/// every other service in the namespace contributes replicas.
pub struct RegistryDiscovery<R> {
    registry: R,
    namespace: String,
    master_service: String,
    scheme: String,
    app_port: u16,
}

impl<R: ServiceRegistry> RegistryDiscovery<R> {
    pub fn new(
        registry: R,
        namespace: impl Into<String>,
        master_service: impl Into<String>,
        scheme: impl Into<String>,
        app_port: u16,
    ) -> Self {
        Self {
            registry,
            namespace: namespace.into(),
            master_service: master_service.into(),
            scheme: scheme.into(),
            app_port,
        }
    }

    fn endpoints(&self, addresses: &[String], role: NodeRole) -> Vec<Endpoint> {
        addresses
            .iter()
            .filter_map(|address| {
                match Endpoint::from_instance(&self.scheme, address, self.app_port, role) {
                    Ok(endpoint) => Some(endpoint),
                    Err(e) => {
                        tracing::warn!(address = %address, error = %e, "Skipping unusable instance");
                        None
                    }
                }
            })
            .collect()
    }
}

#[async_trait]
impl<R: ServiceRegistry> TopologySource for RegistryDiscovery<R> {
    async fn resolve(&self) -> GatewayResult<Membership> {
        let namespace_id = self
            .registry
            .namespace_id(&self.namespace)
            .await?
            .ok_or_else(|| GatewayError::discovery(format!("Namespace {} not found", self.namespace)))?;

        let services = self.registry.service_names(&namespace_id).await?;
        if !services.iter().any(|s| *s == self.master_service) {
            return Err(GatewayError::discovery(format!(
                "Master service {} not found in namespace {}",
                self.master_service, self.namespace
            )));
        }

        let master_addresses = self
            .registry
            .instance_addresses(&self.namespace, &self.master_service)
            .await?;
        let master = self
            .endpoints(&master_addresses, NodeRole::Master)
            .into_iter()
            .next()
            .ok_or_else(|| {
                GatewayError::discovery(format!(
                    "No master instance registered under {}",
                    self.master_service
                ))
            })?;

        let replica_services = services.iter().filter(|s| **s != self.master_service);
        let replica_addresses = try_join_all(
            replica_services.map(|service| self.registry.instance_addresses(&self.namespace, service)),
        )
        .await?;

        let mut replicas: Vec<Endpoint> = Vec::new();
        for endpoint in self.endpoints(&replica_addresses.concat(), NodeRole::Replica) {
            if !replicas.contains(&endpoint) {
                replicas.push(endpoint);
            }
        }

        tracing::info!(
            namespace = %self.namespace,
            master = %master.address(),
            replicas = replicas.len(),
            "Discovered cluster members"
        );

        Ok(Membership { master, replicas })
    }
}

/// Memoizes the last topology for `ttl`.
///
/// Concurrent misses each resolve and the last to finish wins. A failed
/// resolution leaves the cached entry as it was.
pub struct TopologyCache {
    source: Arc<dyn TopologySource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    current: RwLock<Option<Arc<ClusterTopology>>>,
}

impl TopologyCache {
    pub fn new(source: Arc<dyn TopologySource>, ttl: Duration) -> Self {
        Self::with_clock(source, Arc::new(SystemClock), ttl)
    }

    pub fn with_clock(source: Arc<dyn TopologySource>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            source,
            clock,
            ttl,
            current: RwLock::new(None),
        }
    }

    /// Cached topology while fresh, otherwise a new resolution
    pub async fn get_topology(&self) -> GatewayResult<Arc<ClusterTopology>> {
        let now = self.clock.now();

        if let Some(cached) = self.current.read().await.as_ref() {
            if cached.is_fresh(now, self.ttl) {
                log::debug!("Using cached topology ({} members)", cached.member_count());
                return Ok(Arc::clone(cached));
            }
        }

        log::info!("Topology cache empty or expired, discovering cluster members");
        let membership = self.source.resolve().await?;
        let topology = Arc::new(ClusterTopology::new(
            membership.master,
            membership.replicas,
            now,
        ));

        *self.current.write().await = Some(Arc::clone(&topology));
        Ok(topology)
    }

    /// Last stored topology, fresh or not
    pub async fn cached(&self) -> Option<Arc<ClusterTopology>> {
        self.current.read().await.clone()
    }
}
