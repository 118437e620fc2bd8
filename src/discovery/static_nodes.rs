/// Fixed membership from configuration
use async_trait::async_trait;

use super::{Membership, TopologySource};
use crate::core::{Endpoint, NodeRole};
use crate::error::GatewayResult;

#[derive(Debug, Clone)]
pub struct StaticTopology {
    membership: Membership,
}

impl StaticTopology {
    pub fn new(master: &str, replicas: &[String]) -> GatewayResult<Self> {
        let master = Endpoint::parse(master, NodeRole::Master)?;
        let replicas = replicas
            .iter()
            .map(|address| Endpoint::parse(address, NodeRole::Replica))
            .collect::<GatewayResult<Vec<_>>>()?;
        Ok(Self {
            membership: Membership { master, replicas },
        })
    }
}

#[async_trait]
impl TopologySource for StaticTopology {
    async fn resolve(&self) -> GatewayResult<Membership> {
        Ok(self.membership.clone())
    }
}
