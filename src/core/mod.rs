/// Core abstractions shared by discovery, recovery and the coordinators
pub mod backend;
pub mod frontend;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use std::fmt;
use std::time::{Duration, Instant};
use url::Url;

use crate::error::{GatewayError, GatewayResult, NetworkFailure};

/// Role of a cluster member, fixed when the member is discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Master,
    Replica,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Master => write!(f, "master"),
            NodeRole::Replica => write!(f, "replica"),
        }
    }
}

/// Address of one cluster member (scheme, host, port and optional base path/query)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    url: Url,
    role: NodeRole,
}

impl Endpoint {
    /// Parse an absolute http(s) URL
    pub fn parse(address: &str, role: NodeRole) -> GatewayResult<Self> {
        let url = Url::parse(address).map_err(|e| GatewayError::InvalidEndpoint {
            address: address.to_string(),
            reason: e.to_string(),
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(GatewayError::InvalidEndpoint {
                address: address.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        if url.host_str().is_none() {
            return Err(GatewayError::InvalidEndpoint {
                address: address.to_string(),
                reason: "missing host".to_string(),
            });
        }

        Ok(Self { url, role })
    }

    /// Build the endpoint of a registry instance listening on the application port
    pub fn from_instance(scheme: &str, host: &str, port: u16, role: NodeRole) -> GatewayResult<Self> {
        if host.contains(':') && !host.starts_with('[') {
            Self::parse(&format!("{}://[{}]:{}", scheme, host, port), role)
        } else {
            Self::parse(&format!("{}://{}:{}", scheme, host, port), role)
        }
    }

    pub fn with_role(mut self, role: NodeRole) -> Self {
        self.role = role;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn address(&self) -> &str {
        self.url.as_str()
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn is_master(&self) -> bool {
        self.role == NodeRole::Master
    }

    /// Whether the member is reached over TLS
    pub fn uses_tls(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// Full URL for `path` and `query` on this member.
    ///
    /// The endpoint's own base path comes first, then `path`. Runs of slashes
    /// collapse to one, so a base of `/proxy/` with an empty path stays
    /// `/proxy/`. The endpoint's own query pairs are kept and `query` is
    /// appended after them in order, duplicates and key-only entries included.
    pub fn target_url(&self, path: &str, query: &[QueryParam]) -> Url {
        let mut url = self.url.clone();

        let joined = collapse_slashes(&format!("{}/{}", url.path(), path));
        url.set_path(&joined);

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                match value {
                    Some(value) => pairs.append_pair(key, value),
                    None => pairs.append_key_only(key),
                };
            }
        }

        url
    }
}

fn collapse_slashes(path: &str) -> String {
    let mut collapsed = String::with_capacity(path.len());
    for c in path.chars() {
        if c == '/' && collapsed.ends_with('/') {
            continue;
        }
        collapsed.push(c);
    }
    collapsed
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.url, self.role)
    }
}

/// Resolved cluster membership: one master, zero or more replicas
#[derive(Debug, Clone)]
pub struct ClusterTopology {
    master: Endpoint,
    replicas: Vec<Endpoint>,
    fetched_at: Instant,
}

impl ClusterTopology {
    /// Roles are forced to match the position and duplicate addresses are dropped
    pub fn new<I>(master: Endpoint, replicas: I, fetched_at: Instant) -> Self
    where
        I: IntoIterator<Item = Endpoint>,
    {
        let master = master.with_role(NodeRole::Master);
        let mut unique: Vec<Endpoint> = Vec::new();

        for replica in replicas {
            let replica = replica.with_role(NodeRole::Replica);
            if replica.url == master.url || unique.iter().any(|r| r.url == replica.url) {
                continue;
            }
            unique.push(replica);
        }

        Self {
            master,
            replicas: unique,
            fetched_at,
        }
    }

    pub fn master(&self) -> &Endpoint {
        &self.master
    }

    pub fn replicas(&self) -> &[Endpoint] {
        &self.replicas
    }

    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// Master first, then replicas in discovery order
    pub fn members(&self) -> impl Iterator<Item = &Endpoint> {
        std::iter::once(&self.master).chain(self.replicas.iter())
    }

    pub fn member_count(&self) -> usize {
        1 + self.replicas.len()
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.fetched_at)
    }

    /// Fresh while `now - fetched_at <= ttl`
    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        self.age(now) <= ttl
    }
}

/// One query parameter; `None` is a bare key such as `?flag`
pub type QueryParam = (String, Option<String>);

/// Request forwarded unchanged to every member it is sent to
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<QueryParam>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyRequest {
    pub fn new<P: Into<String>>(method: Method, path: P) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_query<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.query.push((key.into(), Some(value.into())));
        self
    }

    pub fn with_flag<K: Into<String>>(mut self, key: K) -> Self {
        self.query.push((key.into(), None));
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    /// Media type of the body, lowercased and without parameters
    pub fn media_type(&self) -> Option<String> {
        let value = self.headers.get(CONTENT_TYPE)?.to_str().ok()?;
        let media_type = value.split(';').next().unwrap_or_default().trim();
        if media_type.is_empty() {
            None
        } else {
            Some(media_type.to_ascii_lowercase())
        }
    }
}

/// An HTTP reply received from a member, whatever its status code
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BackendResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Outcome of one member call
pub type BackendResult = Result<BackendResponse, NetworkFailure>;
