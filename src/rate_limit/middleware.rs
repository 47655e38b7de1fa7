use super::identity::{AuthenticatedCaller, RequestIdentity};
use super::service::{Admission, AdmissionController};
use super::types::Decision;
use crate::error::error_body;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use tracing::debug;
use uuid::Uuid;

pub const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
const API_KEY_HEADER: &str = "x-api-key";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const REAL_IP_HEADER: &str = "x-real-ip";

/// Request extension exempting a request from admission accounting.
///
/// Only trusted middleware should insert it; no client header maps onto it.
#[derive(Debug, Clone, Copy, Default)]
pub struct BypassAdmission;

/// Build the controller's view of a request
pub fn request_identity(
    headers: &HeaderMap,
    caller: Option<&AuthenticatedCaller>,
    peer: Option<IpAddr>,
    trust_forwarded_for: bool,
) -> RequestIdentity {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    let forwarded = if trust_forwarded_for {
        forwarded_ip(headers)
    } else {
        None
    };

    RequestIdentity {
        caller: caller.cloned(),
        authorization: header(AUTHORIZATION.as_str()),
        api_key: header(API_KEY_HEADER),
        source_ip: forwarded.or(peer),
    }
}

/// First address of `X-Forwarded-For`, else `X-Real-IP`
fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let parse = |name: &str| {
        headers
            .get(name)?
            .to_str()
            .ok()?
            .split(',')
            .next()?
            .trim()
            .parse::<IpAddr>()
            .ok()
    };

    parse(FORWARDED_FOR_HEADER).or_else(|| parse(REAL_IP_HEADER))
}

/// Axum middleware applying admission control to every request
pub async fn admission_middleware(
    State(controller): State<AdmissionController>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    if request.extensions().get::<BypassAdmission>().is_some() {
        debug!("Request flagged to bypass admission");
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    let identity = request_identity(
        request.headers(),
        request.extensions().get::<AuthenticatedCaller>(),
        connect_info.map(|ConnectInfo(addr)| addr.ip()),
        controller.trust_forwarded_for(),
    );

    let ticket = match controller.admit(&identity, &path) {
        Admission::Bypass => return next.run(request).await,
        Admission::Decided(ticket) => ticket,
    };

    if !ticket.allowed() {
        let request_id = request_id(request.headers());
        return rate_limited_response(&ticket.decision, &request_id);
    }

    let response = next.run(request).await;
    controller.settle(&ticket, response.status());

    add_rate_limit_headers(response, &ticket.decision)
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Create a 429 Too Many Requests response with rate limit headers
pub fn rate_limited_response(decision: &Decision, request_id: &str) -> Response {
    let message = format!(
        "Too many requests, please retry after {} seconds",
        decision.retry_after_secs
    );
    let body = error_body(
        "RATE_LIMITED",
        &message,
        Some(json!({
            "limit": decision.limit,
            "remaining": 0,
            "retryAfter": decision.retry_after_secs,
        })),
        Some(request_id),
    );

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(
        axum::http::header::RETRY_AFTER,
        HeaderValue::from(decision.retry_after_secs),
    );
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }

    add_rate_limit_headers(response, decision)
}

/// Attach `X-RateLimit-*` headers to a response
pub fn add_rate_limit_headers(mut response: Response, decision: &Decision) -> Response {
    let headers = response.headers_mut();

    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(
        RATE_LIMIT_RESET,
        HeaderValue::from(decision.reset_epoch_secs()),
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(allowed: bool) -> Decision {
        Decision {
            allowed,
            limit: 5,
            remaining: 0,
            reset_at_ms: 1_700_000_060_000,
            retry_after_secs: if allowed { 0 } else { 42 },
        }
    }

    #[test]
    fn test_request_identity_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("key-123"));

        let caller = AuthenticatedCaller::new("7");
        let identity = request_identity(
            &headers,
            Some(&caller),
            Some("10.0.0.5".parse().unwrap()),
            false,
        );

        assert_eq!(identity.caller, Some(caller));
        assert_eq!(identity.authorization.as_deref(), Some("Bearer abc"));
        assert_eq!(identity.api_key.as_deref(), Some("key-123"));
        assert_eq!(identity.source_ip, Some("10.0.0.5".parse().unwrap()));
    }

    #[test]
    fn test_forwarded_for_only_when_trusted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR_HEADER,
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        let peer = Some("10.0.0.1".parse().unwrap());

        let untrusted = request_identity(&headers, None, peer, false);
        assert_eq!(untrusted.source_ip, peer);

        let trusted = request_identity(&headers, None, peer, true);
        assert_eq!(trusted.source_ip, Some("203.0.113.9".parse().unwrap()));
    }

    #[test]
    fn test_real_ip_fallback_and_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR_HEADER, HeaderValue::from_static("not-an-ip"));
        headers.insert(REAL_IP_HEADER, HeaderValue::from_static("198.51.100.4"));

        assert_eq!(forwarded_ip(&headers), Some("198.51.100.4".parse().unwrap()));
        assert_eq!(forwarded_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn test_request_id_generated_when_missing() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id(&headers).len(), 36);

        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-abc"));
        assert_eq!(request_id(&headers), "req-abc");
    }

    #[test]
    fn test_rate_limit_response() {
        let response = rate_limited_response(&decision(false), "req-1");

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let headers = response.headers();
        assert_eq!(headers.get("X-RateLimit-Limit").unwrap(), "5");
        assert_eq!(headers.get("X-RateLimit-Remaining").unwrap(), "0");
        assert_eq!(headers.get("X-RateLimit-Reset").unwrap(), "1700000060");
        assert_eq!(headers.get("Retry-After").unwrap(), "42");
        assert_eq!(headers.get("x-request-id").unwrap(), "req-1");
    }

    #[test]
    fn test_add_rate_limit_headers_without_retry_after() {
        let mut allowed = decision(true);
        allowed.remaining = 3;
        let response = add_rate_limit_headers(StatusCode::OK.into_response(), &allowed);

        let headers = response.headers();
        assert_eq!(headers.get("X-RateLimit-Remaining").unwrap(), "3");
        assert!(headers.get("Retry-After").is_none());
    }
}
