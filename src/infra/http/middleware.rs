use std::{
    sync::Arc,
    time::{Instant, SystemTime, UNIX_EPOCH},
};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{
        HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode,
        header::{self, RETRY_AFTER},
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

use super::{
    peer::PeerAddr,
    rate_limit::{Admission, ContactRateLimiter},
};

pub const RATE_LIMITED_METRIC: &str = "contact_relay_rate_limited_total";
const RATE_LIMITED_BODY: &str = "Too many requests, please try again later.";
const CORS_ALLOWED_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";

const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");

const SECURITY_HEADERS: &[(&str, &str)] = &[
    (
        "content-security-policy",
        "default-src 'self';base-uri 'self';font-src 'self' https: data:;form-action 'self';\
         frame-ancestors 'self';img-src 'self' data:;object-src 'none';script-src 'self';\
         script-src-attr 'none';style-src 'self' https: 'unsafe-inline';upgrade-insecure-requests",
    ),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("referrer-policy", "no-referrer"),
    (
        "strict-transport-security",
        "max-age=31536000; includeSubDomains",
    ),
    ("x-content-type-options", "nosniff"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
    ("x-xss-protection", "0"),
];

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "contact_relay::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                "request failed",
            );
        } else {
            warn!(
                target = "contact_relay::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                request_id = request_id,
                "client request error",
            );
        }
    }

    response
}

/// Apply the hardened default header set to every response.
pub async fn security_headers(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.remove(&X_POWERED_BY);
    for (name, value) in SECURITY_HEADERS {
        headers
            .entry(HeaderName::from_static(*name))
            .or_insert_with(|| HeaderValue::from_static(*value));
    }
    response
}

/// Cross-origin policy allowing exactly one browser origin.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_origin: HeaderValue,
}

impl CorsPolicy {
    pub fn new(allowed_origin: HeaderValue) -> Self {
        Self { allowed_origin }
    }

    fn is_preflight(request: &Request<Body>) -> bool {
        request.method() == Method::OPTIONS
            && request
                .headers()
                .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
    }

    fn preflight_response(&self, request_headers: &HeaderMap) -> Response {
        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            self.allowed_origin.clone(),
        );
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(CORS_ALLOWED_METHODS),
        );
        if let Some(requested) = request_headers.get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
            headers.append(
                header::VARY,
                HeaderValue::from_static("Access-Control-Request-Headers"),
            );
        }
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        response
    }
}

pub async fn apply_cors(
    State(policy): State<Arc<CorsPolicy>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if CorsPolicy::is_preflight(&request) {
        return policy.preflight_response(request.headers());
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        policy.allowed_origin.clone(),
    );
    headers.append(header::VARY, HeaderValue::from_static("Origin"));
    response
}

pub async fn rate_limit(
    State(limiter): State<Arc<ContactRateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let caller = caller_identity(&request, limiter.trusts_forwarded_for());
    let admission = limiter.allow(&caller);

    if !admission.allowed {
        counter!(RATE_LIMITED_METRIC).increment(1);
        return rate_limited_response(&limiter, &admission, &caller);
    }

    let mut response = next.run(request).await;
    insert_limit_headers(response.headers_mut(), limiter.limit(), &admission);
    response
}

fn caller_identity(request: &Request<Body>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get(&X_FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(client) = forwarded {
            return client.to_string();
        }
    }

    match request.extensions().get::<ConnectInfo<PeerAddr>>() {
        Some(ConnectInfo(PeerAddr(addr))) => addr.ip().to_string(),
        None => {
            debug!(
                target = "contact_relay::http::ratelimit",
                "no peer address on request; using shared bucket"
            );
            "unknown".to_string()
        }
    }
}

fn rate_limited_response(
    limiter: &ContactRateLimiter,
    admission: &Admission,
    caller: &str,
) -> Response {
    let retry_after = admission.reset_after_secs();
    let mut response = (StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED_BODY).into_response();
    let headers = response.headers_mut();
    headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
    insert_limit_headers(headers, limiter.limit(), admission);
    ErrorReport::from_message(
        "infra::http::rate_limit",
        StatusCode::TOO_MANY_REQUESTS,
        format!("rate_limited: caller={caller} retry_after={retry_after}"),
    )
    .attach(&mut response);
    response
}

/// Limit, remaining slots, and the reset instant as Unix seconds.
fn insert_limit_headers(headers: &mut HeaderMap, limit: u32, admission: &Admission) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(admission.remaining));
    if let Some(reset_at) = SystemTime::now()
        .checked_add(admission.reset_after)
        .and_then(|at| at.duration_since(UNIX_EPOCH).ok())
    {
        let secs = reset_at.as_secs() + u64::from(reset_at.subsec_nanos() > 0);
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(secs));
    }
}
