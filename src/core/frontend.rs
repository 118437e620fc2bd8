/// Inbound event and outbound response shapes of the router entry point
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::core::{BackendResponse, ProxyRequest};
use crate::error::{GatewayError, GatewayResult};
use crate::utils::decode_body;

/// Gateway-style request event: `{ httpMethod, path, queryStringParameters, headers, body }`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    pub http_method: String,
    #[serde(default)]
    pub path: Option<String>,
    /// Kept in document order
    #[serde(default, deserialize_with = "ordered_pairs")]
    pub query_string_parameters: Vec<(String, String)>,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

impl InboundEvent {
    /// Convert into the request forwarded to members.
    ///
    /// Headers whose name or value is not valid HTTP are dropped with a warning;
    /// an unparseable method is an error.
    pub fn into_proxy_request(self) -> GatewayResult<ProxyRequest> {
        let method = Method::from_bytes(self.http_method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| {
                GatewayError::invalid_request(format!("invalid HTTP method '{}'", self.http_method))
            })?;

        let mut headers = HeaderMap::new();
        for (name, value) in self.headers.unwrap_or_default() {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => log::warn!("Dropping invalid inbound header '{}'", name),
            }
        }

        Ok(ProxyRequest {
            method,
            path: self.path.unwrap_or_default(),
            query: self
                .query_string_parameters
                .into_iter()
                .map(|(key, value)| (key, Some(value)))
                .collect(),
            headers,
            body: decode_body(self.body, self.is_base64_encoded),
        })
    }
}

/// A JSON object (or null) as its entries in document order
fn ordered_pairs<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct PairsVisitor;

    impl<'de> Visitor<'de> for PairsVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of strings or null")
        }

        fn visit_none<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_unit<E: serde::de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
            deserializer.deserialize_map(self)
        }

        fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> Result<Self::Value, M::Error> {
            let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(pair) = map.next_entry::<String, String>()? {
                pairs.push(pair);
            }
            Ok(pairs)
        }
    }

    deserializer.deserialize_option(PairsVisitor)
}

/// What the entry point returns: `{ statusCode, body, headers }`
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OutboundResponse {
    /// JSON body with a matching content type
    pub fn json(status: StatusCode, value: serde_json::Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            status,
            headers,
            body: Bytes::from(value.to_string()),
        }
    }

    /// Uniform failure response; never carries internal detail
    pub fn internal_error() -> Self {
        Self::json(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Internal Server Error" }),
        )
    }

    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl From<BackendResponse> for OutboundResponse {
    fn from(response: BackendResponse) -> Self {
        Self {
            status: response.status,
            headers: response.headers,
            body: response.body,
        }
    }
}
