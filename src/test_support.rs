/// In-process fakes for the registry, members, control plane and clock
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::core::backend::BackendClient;
use crate::core::{
    BackendResponse, BackendResult, ClusterTopology, Endpoint, NodeRole, ProxyRequest, QueryParam,
};
use crate::discovery::{Clock, Membership, TopologySource};
use crate::error::{GatewayError, GatewayResult, NetworkFailure};
use crate::recovery::{ControlPlane, RecoveryTarget};

/// Endpoint for a short host name, e.g. `ep("a", NodeRole::Master)` → `http://a:8080/`
pub fn ep(host: &str, role: NodeRole) -> Endpoint {
    Endpoint::from_instance("http", host, 8080, role).unwrap()
}

/// Topology with master `master` and replicas `replicas`, fetched now
pub fn topology(master: &str, replicas: &[&str]) -> Arc<ClusterTopology> {
    Arc::new(ClusterTopology::new(
        ep(master, NodeRole::Master),
        replicas.iter().map(|r| ep(r, NodeRole::Replica)),
        Instant::now(),
    ))
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Manually advanced clock
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }
}

/// Topology source that counts calls; call `n` (1-based) returns master `master-n`
pub struct CountingSource {
    calls: AtomicUsize,
    replicas: Vec<String>,
    failing: std::sync::atomic::AtomicBool,
}

impl CountingSource {
    pub fn new(replicas: &[&str]) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            replicas: replicas.iter().map(|r| r.to_string()).collect(),
            failing: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl TopologySource for CountingSource {
    async fn resolve(&self) -> GatewayResult<Membership> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::discovery("registry unavailable"));
        }
        Ok(Membership {
            master: ep(&format!("master-{}", call), NodeRole::Master),
            replicas: self
                .replicas
                .iter()
                .map(|r| ep(r, NodeRole::Replica))
                .collect(),
        })
    }
}

/// Scripted behaviour of one member
#[derive(Debug, Clone)]
pub enum Script {
    Respond {
        status: u16,
        body: &'static str,
        delay: Duration,
    },
    Fail {
        delay: Duration,
    },
}

/// A request as seen by a scripted member
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub host: String,
    pub method: Method,
    pub path: String,
    pub query: Vec<QueryParam>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Member fake keyed by host name. Unscripted hosts answer 200 "ok".
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, host: &str, status: u16, body: &'static str) -> Self {
        self.respond_after(host, status, body, Duration::ZERO)
    }

    pub fn respond_after(self, host: &str, status: u16, body: &'static str, delay: Duration) -> Self {
        self.scripts.lock().unwrap().insert(
            host.to_string(),
            Script::Respond {
                status,
                body,
                delay,
            },
        );
        self
    }

    pub fn fail(self, host: &str) -> Self {
        self.fail_after(host, Duration::ZERO)
    }

    pub fn fail_after(self, host: &str, delay: Duration) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(host.to_string(), Script::Fail { delay });
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, host: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.host == host)
            .collect()
    }
}

#[async_trait]
impl BackendClient for ScriptedBackend {
    async fn forward(&self, endpoint: &Endpoint, request: &ProxyRequest) -> BackendResult {
        let host = endpoint.url().host_str().unwrap_or_default().to_string();
        self.calls.lock().unwrap().push(RecordedCall {
            host: host.clone(),
            method: request.method.clone(),
            path: request.path.clone(),
            query: request.query.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
        });

        let script = self.scripts.lock().unwrap().get(&host).cloned();
        match script {
            Some(Script::Respond {
                status,
                body,
                delay,
            }) => {
                tokio::time::sleep(delay).await;
                Ok(BackendResponse::new(StatusCode::from_u16(status).unwrap()).with_body(body))
            }
            Some(Script::Fail { delay }) => {
                tokio::time::sleep(delay).await;
                Err(NetworkFailure::new(endpoint.address(), "connection refused"))
            }
            None => Ok(BackendResponse::new(StatusCode::OK).with_body("ok")),
        }
    }
}

/// Control plane that records every redeploy request
#[derive(Default)]
pub struct RecordingControlPlane {
    targets: Mutex<Vec<RecoveryTarget>>,
    failing: bool,
}

impl RecordingControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn targets(&self) -> Vec<RecoveryTarget> {
        self.targets.lock().unwrap().clone()
    }

    /// Number of redeploy requests naming the member on `host`
    pub fn count_for(&self, host: &str) -> usize {
        self.targets()
            .iter()
            .filter(|t| t.member.url().host_str() == Some(host))
            .count()
    }

    pub fn total(&self) -> usize {
        self.targets.lock().unwrap().len()
    }
}

#[async_trait]
impl ControlPlane for RecordingControlPlane {
    async fn force_redeploy(&self, target: &RecoveryTarget) -> GatewayResult<()> {
        self.targets.lock().unwrap().push(target.clone());
        if self.failing {
            return Err(GatewayError::recovery("control plane unavailable"));
        }
        Ok(())
    }
}

type AwsReply = dyn Fn(&str, &serde_json::Value) -> (u16, serde_json::Value) + Send + Sync;

/// Local stand-in for an AWS JSON-1.1 service.
///
/// Records `(operation, body)` for every call and answers through `reply`.
pub struct AwsJsonStub {
    pub url: String,
    requests: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
}

impl AwsJsonStub {
    pub async fn start<F>(reply: F) -> Self
    where
        F: Fn(&str, &serde_json::Value) -> (u16, serde_json::Value) + Send + Sync + 'static,
    {
        let reply: Arc<AwsReply> = Arc::new(reply);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);

        let app = axum::Router::new().fallback(move |headers: HeaderMap, body: Bytes| {
            let reply = Arc::clone(&reply);
            let recorded = Arc::clone(&recorded);
            async move {
                let operation = headers
                    .get("x-amz-target")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|target| target.rsplit('.').next())
                    .unwrap_or_default()
                    .to_string();
                let body: serde_json::Value =
                    serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
                let (status, answer) = reply(&operation, &body);
                recorded.lock().unwrap().push((operation, body));
                (
                    StatusCode::from_u16(status).unwrap(),
                    [(http::header::CONTENT_TYPE, "application/x-amz-json-1.1")],
                    answer.to_string(),
                )
            }
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { url, requests }
    }

    pub fn requests(&self) -> Vec<(String, serde_json::Value)> {
        self.requests.lock().unwrap().clone()
    }
}
