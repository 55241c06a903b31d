//! Client identity resolution.
//!
//! Derives the string key used to bucket rate-limit counters and abuse
//! tracking, preferring proxy-forwarded headers over the transport-level
//! peer address.

use axum::extract::{ConnectInfo, Request};
use std::net::SocketAddr;

/// Sentinel identity when nothing about the client's origin is known.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Resolve the identity key for a request.
///
/// Checks the first entry of `X-Forwarded-For`, then `X-Real-IP`, then the
/// peer address from `ConnectInfo`, and finally falls back to `"unknown"`.
/// Always returns a non-empty string; never fails.
pub fn resolve_client_key(req: &Request) -> String {
    if let Some(forwarded_for) = req.headers().get("x-forwarded-for") {
        if let Ok(value) = forwarded_for.to_str() {
            // Take the first entry in the list; later entries are proxies.
            if let Some(first) = value.split(',').next() {
                let first = first.trim();
                if !first.is_empty() {
                    return first.to_string();
                }
            }
        }
    }

    if let Some(real_ip) = req.headers().get("x-real-ip") {
        if let Ok(value) = real_ip.to_str() {
            let value = value.trim();
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    fn request() -> axum::http::request::Builder {
        HttpRequest::builder().uri("/analyze")
    }

    #[test]
    fn test_forwarded_for_takes_precedence() {
        let req = request()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .header("x-real-ip", "198.51.100.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(resolve_client_key(&req), "203.0.113.9");
    }

    #[test]
    fn test_real_ip_fallback() {
        let req = request()
            .header("x-real-ip", "198.51.100.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(resolve_client_key(&req), "198.51.100.2");
    }

    #[test]
    fn test_peer_address_fallback() {
        let mut req = request().body(Body::empty()).unwrap();
        let addr: SocketAddr = "192.0.2.7:4242".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(resolve_client_key(&req), "192.0.2.7");
    }

    #[test]
    fn test_unknown_sentinel() {
        let req = request().body(Body::empty()).unwrap();
        assert_eq!(resolve_client_key(&req), UNKNOWN_CLIENT);
    }

    #[test]
    fn test_empty_forwarded_for_is_skipped() {
        let req = request()
            .header("x-forwarded-for", "  ")
            .header("x-real-ip", "198.51.100.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(resolve_client_key(&req), "198.51.100.2");
    }
}
