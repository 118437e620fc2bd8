/// Member forwarding: one HTTP(S) exchange with one cluster member
use async_trait::async_trait;
use base64::prelude::*;
use http::header::{AUTHORIZATION, CONNECTION, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::HeaderValue;
use std::error::Error as _;
use std::time::Duration;

use crate::config::BackendConfig;
use crate::core::{BackendResponse, BackendResult, Endpoint, ProxyRequest};
use crate::error::{GatewayError, GatewayResult, NetworkFailure};

/// Sends a request to a single member.
///
/// Implementations return `Ok` for every HTTP reply, whatever its status, and
/// `Err(NetworkFailure)` only when no reply was obtained.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn forward(&self, endpoint: &Endpoint, request: &ProxyRequest) -> BackendResult;
}

/// Connection options for `HttpBackendClient`
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub request_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    /// Basic auth credentials sent to every member
    pub credentials: Option<(String, String)>,
}

impl From<&BackendConfig> for ClientOptions {
    fn from(config: &BackendConfig) -> Self {
        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        };
        Self {
            request_timeout: config.request_timeout_ms.map(Duration::from_millis),
            connect_timeout: config.connect_timeout_ms.map(Duration::from_millis),
            credentials,
        }
    }
}

/// reqwest-backed forwarding client. Plaintext or TLS follows the endpoint scheme.
#[derive(Clone)]
pub struct HttpBackendClient {
    client: reqwest::Client,
    authorization: Option<HeaderValue>,
}

impl HttpBackendClient {
    pub fn new(options: ClientOptions) -> GatewayResult<Self> {
        let mut builder = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = options.request_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = options.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| GatewayError::internal(format!("failed to build HTTP client: {}", e)))?;

        let authorization = match options.credentials {
            Some((user, password)) => {
                let token = BASE64_STANDARD.encode(format!("{}:{}", user, password));
                let mut value = HeaderValue::from_str(&format!("Basic {}", token))
                    .map_err(|e| GatewayError::internal(format!("invalid credentials: {}", e)))?;
                value.set_sensitive(true);
                Some(value)
            }
            None => None,
        };

        Ok(Self {
            client,
            authorization,
        })
    }

    pub fn from_config(config: &BackendConfig) -> GatewayResult<Self> {
        Self::new(ClientOptions::from(config))
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn forward(&self, endpoint: &Endpoint, request: &ProxyRequest) -> BackendResult {
        let url = endpoint.target_url(&request.path, &request.query);

        // The transport computes these for the outgoing exchange
        let mut headers = request.headers.clone();
        for name in [HOST, CONTENT_LENGTH, TRANSFER_ENCODING, CONNECTION] {
            headers.remove(name);
        }
        if let Some(authorization) = &self.authorization {
            headers.insert(AUTHORIZATION, authorization.clone());
        }

        tracing::trace!(
            endpoint = %endpoint,
            tls = endpoint.uses_tls(),
            method = %request.method,
            url = %url,
            "Forwarding request"
        );

        let mut outgoing = self
            .client
            .request(request.method.clone(), url)
            .headers(headers);
        if !request.body.is_empty() {
            outgoing = outgoing.body(request.body.clone());
        }

        let response = outgoing
            .send()
            .await
            .map_err(|e| NetworkFailure::new(endpoint.address(), describe(&e)))?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkFailure::new(endpoint.address(), describe(&e)))?;

        Ok(BackendResponse {
            status,
            headers,
            body,
        })
    }
}

/// Error text including the innermost cause (reqwest's own message is generic)
fn describe(error: &reqwest::Error) -> String {
    let kind = if error.is_timeout() {
        "timed out"
    } else if error.is_connect() {
        "connect failed"
    } else if error.is_body() || error.is_decode() {
        "body failed"
    } else {
        "request failed"
    };

    let mut cause = error.source();
    let mut root = None;
    while let Some(inner) = cause {
        root = Some(inner.to_string());
        cause = inner.source();
    }

    match root {
        Some(root) => format!("{}: {}", kind, root),
        None => format!("{}: {}", kind, error),
    }
}
