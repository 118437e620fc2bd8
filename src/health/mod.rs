/// Health checking of the cluster master
use async_trait::async_trait;
use http::{Method, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::core::backend::BackendClient;
use crate::core::frontend::OutboundResponse;
use crate::core::{Endpoint, ProxyRequest};

/// Probe budget when none is configured
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Health status of a member
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy { reason: String },
    Timeout,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Unhealthy { reason } => write!(f, "Unhealthy: {}", reason),
            HealthStatus::Timeout => write!(f, "Timeout"),
        }
    }
}

impl HealthStatus {
    /// Check if the status represents a healthy member
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// `200 {"status":"healthy"}` or `500 {"status":"unhealthy"}`
    pub fn to_response(&self) -> OutboundResponse {
        if self.is_healthy() {
            OutboundResponse::json(StatusCode::OK, serde_json::json!({ "status": "healthy" }))
        } else {
            OutboundResponse::json(
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "status": "unhealthy" }),
            )
        }
    }
}

/// Health checker trait
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Perform a health check against one member
    async fn check_health(&self, endpoint: &Endpoint) -> HealthStatus;

    /// Get the timeout for health checks
    fn check_timeout(&self) -> Duration;
}

/// Probes a member with `GET {probe_path}`; any 2xx is healthy
pub struct MasterProbe {
    client: Arc<dyn BackendClient>,
    probe_path: String,
    timeout: Duration,
}

impl MasterProbe {
    pub fn new(client: Arc<dyn BackendClient>, probe_path: impl Into<String>) -> Self {
        Self {
            client,
            probe_path: probe_path.into(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl HealthChecker for MasterProbe {
    async fn check_health(&self, endpoint: &Endpoint) -> HealthStatus {
        let probe = ProxyRequest::new(Method::GET, self.probe_path.as_str());
        match self.client.forward(endpoint, &probe).await {
            Ok(response) if response.is_success() => HealthStatus::Healthy,
            Ok(response) => HealthStatus::Unhealthy {
                reason: format!("probe answered {}", response.status),
            },
            Err(failure) => HealthStatus::Unhealthy {
                reason: failure.reason,
            },
        }
    }

    fn check_timeout(&self) -> Duration {
        self.timeout
    }
}

/// Runs a checker under its timeout and logs the verdict
pub struct HealthCheckManager {
    checker: Box<dyn HealthChecker>,
}

impl HealthCheckManager {
    pub fn new(checker: Box<dyn HealthChecker>) -> Self {
        Self { checker }
    }

    /// Perform health check with timeout
    pub async fn check_endpoint(&self, endpoint: &Endpoint) -> HealthStatus {
        let check_timeout = self.checker.check_timeout();

        let status = match timeout(check_timeout, self.checker.check_health(endpoint)).await {
            Ok(status) => status,
            Err(_) => HealthStatus::Timeout,
        };

        match &status {
            HealthStatus::Healthy => {
                tracing::debug!("Member {} is healthy", endpoint);
            }
            HealthStatus::Unhealthy { reason } => {
                tracing::warn!("Member {} is unhealthy: {}", endpoint, reason);
            }
            HealthStatus::Timeout => {
                tracing::warn!("Health check timeout for member {}", endpoint);
            }
        }

        status
    }
}
