/// AWS Cloud Map as the service registry
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_servicediscovery::error::DisplayErrorContext;
use aws_sdk_servicediscovery::types::{
    FilterCondition, HttpInstanceSummary, ServiceFilter, ServiceFilterName,
};
use aws_sdk_servicediscovery::Client;

use super::ServiceRegistry;
use crate::error::{GatewayError, GatewayResult};

/// Instance attribute carrying the registered IPv4 address
pub const IPV4_ATTRIBUTE: &str = "AWS_INSTANCE_IPV4";

pub struct CloudMapRegistry {
    client: Client,
}

impl CloudMapRegistry {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client built from the ambient AWS configuration, optionally pinned to `region`
    pub async fn from_env(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let config = loader.load().await;
        Self::new(Client::new(&config))
    }
}

/// Registered IPv4 address of every instance that has one, in registry order
fn ipv4_addresses(instances: &[HttpInstanceSummary]) -> Vec<String> {
    instances
        .iter()
        .filter_map(|instance| {
            instance
                .attributes()
                .and_then(|attributes| attributes.get(IPV4_ATTRIBUTE))
                .cloned()
        })
        .collect()
}

fn sdk_error<E: std::error::Error>(operation: &str, error: E) -> GatewayError {
    GatewayError::discovery(format!("{} failed: {}", operation, DisplayErrorContext(error)))
}

#[async_trait]
impl ServiceRegistry for CloudMapRegistry {
    async fn namespace_id(&self, name: &str) -> GatewayResult<Option<String>> {
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .client
                .list_namespaces()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| sdk_error("ListNamespaces", e))?;

            if let Some(namespace) = page.namespaces().iter().find(|ns| ns.name() == Some(name)) {
                return Ok(namespace.id().map(str::to_string));
            }

            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => return Ok(None),
            }
        }
    }

    async fn service_names(&self, namespace_id: &str) -> GatewayResult<Vec<String>> {
        let filter = ServiceFilter::builder()
            .name(ServiceFilterName::NamespaceId)
            .values(namespace_id)
            .condition(FilterCondition::Eq)
            .build()
            .map_err(|e| GatewayError::internal(format!("invalid service filter: {}", e)))?;

        let mut names = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let page = self
                .client
                .list_services()
                .filters(filter.clone())
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| sdk_error("ListServices", e))?;

            names.extend(
                page.services()
                    .iter()
                    .filter_map(|service| service.name().map(str::to_string)),
            );

            match page.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }

        tracing::debug!(namespace_id, services = ?names, "Listed registry services");
        Ok(names)
    }

    async fn instance_addresses(&self, namespace: &str, service: &str) -> GatewayResult<Vec<String>> {
        let output = self
            .client
            .discover_instances()
            .namespace_name(namespace)
            .service_name(service)
            .send()
            .await
            .map_err(|e| sdk_error("DiscoverInstances", e))?;

        Ok(ipv4_addresses(output.instances()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::AwsJsonStub;
    use aws_sdk_servicediscovery::config::Credentials;
    use serde_json::json;

    fn registry(stub: &AwsJsonStub) -> CloudMapRegistry {
        let config = aws_sdk_servicediscovery::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("AKIDTEST", "secret", None, None, "test"))
            .endpoint_url(&stub.url)
            .build();
        CloudMapRegistry::new(Client::from_conf(config))
    }

    #[tokio::test]
    async fn test_namespace_lookup_follows_pages() {
        let stub = AwsJsonStub::start(|_, body| match body.get("NextToken") {
            None => (
                200,
                json!({
                    "Namespaces": [{ "Id": "ns-0", "Name": "other.local" }],
                    "NextToken": "page-2"
                }),
            ),
            Some(_) => (200, json!({ "Namespaces": [{ "Id": "ns-1", "Name": "rdf4j.local" }] })),
        })
        .await;
        let registry = registry(&stub);

        assert_eq!(
            registry.namespace_id("rdf4j.local").await.unwrap().as_deref(),
            Some("ns-1")
        );
        let requests = stub.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|(operation, _)| operation == "ListNamespaces"));
        assert_eq!(requests[1].1["NextToken"], "page-2");

        assert_eq!(registry.namespace_id("missing.local").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_service_names_are_filtered_and_paged() {
        let stub = AwsJsonStub::start(|_, body| match body.get("NextToken") {
            None => (
                200,
                json!({
                    "Services": [{ "Id": "srv-1", "Name": "rdf4j-master" }],
                    "NextToken": "page-2"
                }),
            ),
            Some(_) => (
                200,
                json!({
                    "Services": [
                        { "Id": "srv-2", "Name": "rdf4j-replica-a" },
                        { "Id": "srv-3", "Name": "rdf4j-replica-b" }
                    ]
                }),
            ),
        })
        .await;

        let names = registry(&stub).service_names("ns-1").await.unwrap();
        assert_eq!(names, vec!["rdf4j-master", "rdf4j-replica-a", "rdf4j-replica-b"]);

        let requests = stub.requests();
        assert_eq!(requests.len(), 2);
        let (operation, body) = &requests[0];
        assert_eq!(operation, "ListServices");
        assert_eq!(body["Filters"][0]["Name"], "NAMESPACE_ID");
        assert_eq!(body["Filters"][0]["Values"], json!(["ns-1"]));
        assert_eq!(body["Filters"][0]["Condition"], "EQ");
        assert_eq!(requests[1].1["Filters"], body["Filters"]);
    }

    #[tokio::test]
    async fn test_registry_errors_become_discovery_errors() {
        let stub = AwsJsonStub::start(|_, _| {
            (
                400,
                json!({ "__type": "InvalidInput", "Message": "bad filter" }),
            )
        })
        .await;

        let error = registry(&stub).service_names("ns-1").await.unwrap_err();
        assert!(matches!(error, GatewayError::Discovery { .. }));
        assert!(error.to_string().contains("ListServices"));
    }

    #[test]
    fn test_ipv4_addresses_come_from_instance_attributes() {
        let instances = vec![
            HttpInstanceSummary::builder()
                .instance_id("i-1")
                .attributes(IPV4_ATTRIBUTE, "10.0.0.5")
                .attributes("AWS_INSTANCE_PORT", "8080")
                .build(),
            HttpInstanceSummary::builder()
                .instance_id("i-2")
                .attributes("AWS_INSTANCE_IPV6", "fd00::7")
                .build(),
            HttpInstanceSummary::builder()
                .instance_id("i-3")
                .attributes(IPV4_ATTRIBUTE, "10.0.0.6")
                .build(),
        ];
        assert_eq!(ipv4_addresses(&instances), vec!["10.0.0.5", "10.0.0.6"]);
        assert!(ipv4_addresses(&[]).is_empty());
    }
}
