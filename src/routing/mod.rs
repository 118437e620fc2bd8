/// Request routing: classification, topology lookup and dispatch
///
/// Writes go to the master and are replicated in the background
/// (`write::WriteCoordinator`). Reads are raced across every member
/// (`read::ReadCoordinator`). Any error reaching this layer becomes the
/// generic 500 response; detail stays in the logs.
pub mod race;
pub mod read;
pub mod write;

use http::Method;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::core::backend::BackendClient;
use crate::core::frontend::{InboundEvent, OutboundResponse};
use crate::core::{BackendResponse, ProxyRequest};
use crate::discovery::TopologyCache;
use crate::error::GatewayResult;
use crate::health::{HealthCheckManager, HealthStatus, MasterProbe, DEFAULT_PROBE_TIMEOUT};
use crate::recovery::RecoveryController;
use crate::utils::{format_duration, generate_id};

pub use read::ReadCoordinator;
pub use write::{ReplicationReport, WriteCoordinator, WriteOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Read,
    Write,
}

/// POST, PUT, DELETE and PATCH
pub fn is_mutating(method: &Method) -> bool {
    method == Method::POST || method == Method::PUT || method == Method::DELETE || method == Method::PATCH
}

/// Decides whether a request is a read or a write
#[derive(Debug, Clone)]
pub struct RequestClassifier {
    read_content_types: Vec<String>,
}

impl RequestClassifier {
    /// `read_content_types` are media types that keep a mutating method a read
    pub fn new<I, S>(read_content_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            read_content_types: read_content_types
                .into_iter()
                .map(|t| t.as_ref().trim().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn classify(&self, request: &ProxyRequest) -> RequestKind {
        if !is_mutating(&request.method) {
            return RequestKind::Read;
        }
        match request.media_type() {
            Some(media_type) if self.read_content_types.contains(&media_type) => RequestKind::Read,
            _ => RequestKind::Write,
        }
    }
}

impl Default for RequestClassifier {
    fn default() -> Self {
        Self::new(["application/sparql-query"])
    }
}

/// Router settings not owned by its collaborators
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Inbound path answered by the health probe instead of being forwarded
    pub health_path: String,
    pub health_probe_path: String,
    /// A probe still running after this is reported unhealthy
    pub health_check_timeout: Duration,
    pub read_content_types: Vec<String>,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            health_path: "/health".to_string(),
            health_probe_path: "/rdf4j-server/protocol".to_string(),
            health_check_timeout: DEFAULT_PROBE_TIMEOUT,
            read_content_types: vec!["application/sparql-query".to_string()],
        }
    }
}

impl RouterOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            health_path: config.server.health_path.clone(),
            health_probe_path: config.backend.health_probe_path.clone(),
            health_check_timeout: config.health_check_timeout(),
            read_content_types: config.backend.read_content_types.clone(),
        }
    }
}

/// Entry point of the gateway
pub struct Router {
    topology: TopologyCache,
    classifier: RequestClassifier,
    writes: WriteCoordinator,
    reads: ReadCoordinator,
    health: HealthCheckManager,
    health_path: String,
}

impl Router {
    pub fn new(
        topology: TopologyCache,
        client: Arc<dyn BackendClient>,
        recovery: Arc<RecoveryController>,
        options: RouterOptions,
    ) -> Self {
        let probe = MasterProbe::new(Arc::clone(&client), options.health_probe_path)
            .with_timeout(options.health_check_timeout);
        Self {
            topology,
            classifier: RequestClassifier::new(&options.read_content_types),
            writes: WriteCoordinator::new(Arc::clone(&client), Arc::clone(&recovery)),
            reads: ReadCoordinator::new(client, recovery),
            health: HealthCheckManager::new(Box::new(probe)),
            health_path: options.health_path,
        }
    }

    /// Route one request. Never fails: errors become the generic 500.
    pub async fn handle(&self, request: ProxyRequest) -> OutboundResponse {
        let request_id = generate_id("req");

        if request.path == self.health_path {
            return self.check_health(&request_id).await.to_response();
        }

        log::debug!("[{}] {} {}", request_id, request.method, request.path);
        let started = Instant::now();
        match self.dispatch(request, &request_id).await {
            Ok(response) => {
                log::debug!(
                    "[{}] Answered {} in {}",
                    request_id,
                    response.status,
                    format_duration(started.elapsed())
                );
                response.into()
            }
            Err(e) => {
                log::log!(
                    e.severity().log_level(),
                    "[{}] Request failed ({}): {}",
                    request_id,
                    e.severity(),
                    e
                );
                OutboundResponse::internal_error()
            }
        }
    }

    /// Route a gateway-style event
    pub async fn handle_event(&self, event: InboundEvent) -> OutboundResponse {
        match event.into_proxy_request() {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                log::warn!("Rejecting inbound event: {}", e);
                OutboundResponse::internal_error()
            }
        }
    }

    async fn dispatch(&self, request: ProxyRequest, request_id: &str) -> GatewayResult<BackendResponse> {
        let topology = self.topology.get_topology().await?;
        let kind = self.classifier.classify(&request);
        let request = Arc::new(request);

        match kind {
            RequestKind::Write => {
                log::info!("[{}] Write to master {}", request_id, topology.master().address());
                let outcome = self.writes.handle_write(topology, request).await?;
                Ok(outcome.response)
            }
            RequestKind::Read => {
                log::debug!("[{}] Read across {} members", request_id, topology.member_count());
                self.reads.handle_read(topology, request).await
            }
        }
    }

    async fn check_health(&self, request_id: &str) -> HealthStatus {
        match self.topology.get_topology().await {
            Ok(topology) => self.health.check_endpoint(topology.master()).await,
            Err(e) => {
                log::warn!("[{}] Health check could not resolve topology: {}", request_id, e);
                HealthStatus::Unhealthy {
                    reason: e.to_string(),
                }
            }
        }
    }
}
