/// Utility functions and helpers
use base64::prelude::*;
use bytes::Bytes;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Generate a unique ID based on timestamp and random component
pub fn generate_id(prefix: &str) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();

    let random: u32 = rand::random();
    format!("{}-{}-{:x}", prefix, timestamp, random)
}

/// Format duration for human-readable output
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Body bytes of an inbound event. A body flagged as base64 that fails to
/// decode is forwarded as-is.
pub fn decode_body(body: Option<String>, is_base64_encoded: bool) -> Bytes {
    let Some(body) = body else {
        return Bytes::new();
    };

    if !is_base64_encoded {
        return Bytes::from(body);
    }

    match BASE64_STANDARD.decode(body.as_bytes()) {
        Ok(decoded) => Bytes::from(decoded),
        Err(e) => {
            log::warn!("Failed to decode base64 body, forwarding raw payload: {}", e);
            Bytes::from(body)
        }
    }
}
