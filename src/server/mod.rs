/// HTTP front end: every inbound request is handed to the `Router`
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use axum::http::{HeaderMap, Method, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::core::frontend::OutboundResponse;
use crate::core::{ProxyRequest, QueryParam};
use crate::error::{GatewayError, GatewayResult};
use crate::routing::Router;

impl IntoResponse for OutboundResponse {
    fn into_response(self) -> Response {
        let mut headers = self.headers;
        for name in [TRANSFER_ENCODING, CONNECTION, CONTENT_LENGTH] {
            headers.remove(name);
        }
        (self.status, headers, self.body).into_response()
    }
}

/// axum application routing every path and method to `router`.
///
/// Bodies over `max_body_bytes` are answered with 413 before reaching the router.
pub fn app(router: Arc<Router>, max_body_bytes: usize) -> axum::Router {
    axum::Router::new()
        .fallback(proxy)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(router)
}

async fn proxy(
    State(router): State<Arc<Router>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> OutboundResponse {
    router
        .handle(ProxyRequest {
            method,
            path: uri.path().to_string(),
            query: uri.query().map(parse_query).unwrap_or_default(),
            headers,
            body,
        })
        .await
}

/// Decode a raw query string in order; a piece without `=` is a bare key
fn parse_query(raw: &str) -> Vec<QueryParam> {
    raw.split('&')
        .filter(|piece| !piece.is_empty())
        .filter_map(|piece| {
            let (key, value) = url::form_urlencoded::parse(piece.as_bytes()).next()?;
            let value = piece.contains('=').then(|| value.into_owned());
            Some((key.into_owned(), value))
        })
        .collect()
}

/// Bind the configured listen address and serve until the process stops
pub async fn serve(config: &ServerConfig, router: Arc<Router>) -> GatewayResult<()> {
    let listen_addr = &config.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .map_err(|e| GatewayError::internal(format!("failed to bind {}: {}", listen_addr, e)))?;

    let local = listener
        .local_addr()
        .map_err(|e| GatewayError::internal(format!("failed to read local address: {}", e)))?;
    log::info!("triplegate listening on {}", local);

    axum::serve(listener, app(router, config.max_body_bytes))
        .await
        .map_err(|e| GatewayError::internal(format!("server error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::TopologyCache;
    use crate::recovery::{RecoveryController, RecoveryPolicy};
    use crate::routing::RouterOptions;
    use crate::test_support::{CountingSource, RecordingControlPlane, ScriptedBackend};
    use axum::http::{HeaderValue, Method, StatusCode};
    use std::time::Duration;

    async fn spawn_gateway(backend: Arc<ScriptedBackend>) -> std::net::SocketAddr {
        spawn_gateway_with_limit(backend, 1024 * 1024).await
    }

    async fn spawn_gateway_with_limit(
        backend: Arc<ScriptedBackend>,
        max_body_bytes: usize,
    ) -> std::net::SocketAddr {
        let source = Arc::new(CountingSource::new(&["b"]));
        let cache = TopologyCache::new(source, Duration::from_secs(60));
        let recovery = Arc::new(RecoveryController::new(
            Arc::new(RecordingControlPlane::new()),
            RecoveryPolicy::default(),
        ));
        let router = Arc::new(Router::new(cache, backend, recovery, RouterOptions::default()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app(router, max_body_bytes)).await.unwrap();
        });
        addr
    }

    #[test]
    fn test_hop_by_hop_headers_are_dropped() {
        let mut outbound = OutboundResponse::json(StatusCode::OK, serde_json::json!({}));
        outbound
            .headers
            .insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        outbound
            .headers
            .insert("x-rdf4j", HeaderValue::from_static("1"));

        let response = outbound.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(TRANSFER_ENCODING).is_none());
        assert_eq!(response.headers().get("x-rdf4j").unwrap(), "1");
    }

    #[test]
    fn test_parse_query_keeps_order_and_bare_keys() {
        assert_eq!(
            parse_query("flag&x=1&&subj=%3Curn%3As%3E&x=2&empty="),
            vec![
                ("flag".to_string(), None),
                ("x".to_string(), Some("1".to_string())),
                ("subj".to_string(), Some("<urn:s>".to_string())),
                ("x".to_string(), Some("2".to_string())),
                ("empty".to_string(), Some(String::new())),
            ]
        );
        assert!(parse_query("").is_empty());
    }

    #[tokio::test]
    async fn test_bare_query_key_is_forwarded_unchanged() {
        let backend = Arc::new(ScriptedBackend::new());
        let addr = spawn_gateway(backend.clone()).await;

        let response = reqwest::get(format!("http://{}/rdf4j-server/repositories?flag&x=1", addr))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let call = &backend.calls()[0];
        assert_eq!(
            call.query,
            vec![("flag".to_string(), None), ("x".to_string(), Some("1".to_string()))]
        );
        let url = crate::test_support::ep("b", crate::core::NodeRole::Replica)
            .target_url(&call.path, &call.query);
        assert_eq!(url.query(), Some("flag&x=1"));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let backend = Arc::new(ScriptedBackend::new());
        let addr = spawn_gateway_with_limit(backend.clone(), 16).await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/rdf4j-server/repositories/keywords/statements", addr))
            .header("content-type", "application/sparql-update")
            .body(vec![b'x'; 64])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_requests_pass_through_front_end() {
        let backend = Arc::new(ScriptedBackend::new().respond("master-1", 201, "created"));
        let addr = spawn_gateway(backend.clone()).await;
        let client = reqwest::Client::new();

        let response = client
            .request(
                Method::PUT,
                format!("http://{}/rdf4j-server/repositories/keywords/statements?context=%3Curn%3Ag%3E", addr),
            )
            .header("content-type", "text/turtle")
            .body("<urn:s> <urn:p> <urn:o> .")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.text().await.unwrap(), "created");

        let call = &backend.calls_to("master-1")[0];
        assert_eq!(call.method, Method::PUT);
        assert_eq!(call.path, "/rdf4j-server/repositories/keywords/statements");
        assert_eq!(&call.body[..], b"<urn:s> <urn:p> <urn:o> .");
        assert_eq!(call.headers.get("content-type").unwrap(), "text/turtle");
    }

    #[tokio::test]
    async fn test_health_over_http() {
        let backend = Arc::new(ScriptedBackend::new().respond("master-1", 503, ""));
        let addr = spawn_gateway(backend).await;

        let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        assert_eq!(response.text().await.unwrap(), r#"{"status":"unhealthy"}"#);
    }
}
