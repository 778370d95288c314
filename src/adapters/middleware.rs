//! Axum middleware wrapped around the proxy pipeline.
//!
//! These layers handle the concerns that apply to every response regardless
//! of routing: security headers, CORS, request ids and request timing. They
//! hold no mutable state.
use std::{sync::Arc, time::Instant};

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

use crate::config::models::CorsConfig;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Log start/end of a request including latency.
pub async fn request_timing_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let version = req.version();

    tracing::info!("Started processing {} {} {:?}", method, uri, version);

    let response = next.run(req).await;
    let duration = start.elapsed();

    tracing::info!(
        "Completed {} {} {:?} - {} in {:?}",
        method,
        uri,
        version,
        response.status(),
        duration
    );

    response
}

/// Add the standard hardening headers to every response.
pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::X_XSS_PROTECTION,
        HeaderValue::from_static("1; mode=block"),
    );

    response
}

/// Precomputed CORS policy.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_origins: Vec<HeaderValue>,
    allowed_methods: HeaderValue,
    exposed_headers: Option<HeaderValue>,
    allow_credentials: bool,
    max_age: HeaderValue,
}

impl CorsPolicy {
    pub fn from_config(config: &CorsConfig) -> Self {
        let allowed_origins = config
            .allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                    None
                }
            })
            .collect();

        let join = |items: &[String]| HeaderValue::from_str(&items.join(", ")).ok();

        Self {
            allowed_origins,
            allowed_methods: join(config.allowed_methods.as_slice())
                .unwrap_or_else(|| HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS")),
            exposed_headers: join(config.exposed_headers.as_slice()).filter(|v| !v.is_empty()),
            allow_credentials: config.allow_credentials,
            max_age: HeaderValue::from(config.max_age_secs),
        }
    }

    fn allows(&self, origin: &HeaderValue) -> bool {
        self.allowed_origins
            .iter()
            .any(|allowed| allowed == origin || allowed == "*")
    }

    fn is_preflight(req: &Request) -> bool {
        req.method() == Method::OPTIONS
            && req.headers().contains_key(header::ORIGIN)
            && req
                .headers()
                .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
    }

    fn apply_common(&self, headers: &mut HeaderMap, origin: HeaderValue) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin);
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
        if self.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
    }

    fn preflight_response(&self, req: &Request, origin: HeaderValue) -> Response {
        let mut response = Response::new(Body::empty());
        let headers = response.headers_mut();
        self.apply_common(headers, origin);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            self.allowed_methods.clone(),
        );
        // Any requested header is allowed.
        if let Some(requested) = req.headers().get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
        }
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, self.max_age.clone());
        response
    }
}

/// Answer preflight requests and decorate cross-origin responses.
///
/// Preflights from unknown origins are refused with 403 and never reach the
/// proxy. Other requests from unknown origins pass through without CORS
/// headers, leaving enforcement to the browser.
pub async fn cors_middleware(req: Request, next: Next, policy: Arc<CorsPolicy>) -> Response {
    let origin = req.headers().get(header::ORIGIN).cloned();

    if CorsPolicy::is_preflight(&req) {
        return match origin.filter(|o| policy.allows(o)) {
            Some(origin) => policy.preflight_response(&req, origin),
            None => {
                tracing::debug!("Rejected CORS preflight for {}", req.uri());
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::FORBIDDEN;
                response
            }
        };
    }

    let mut response = next.run(req).await;

    if let Some(origin) = origin.filter(|o| policy.allows(o)) {
        let headers = response.headers_mut();
        policy.apply_common(headers, origin);
        if let Some(exposed) = &policy.exposed_headers {
            headers.insert(header::ACCESS_CONTROL_EXPOSE_HEADERS, exposed.clone());
        }
    }

    response
}

/// Create a cloneable closure wrapping [`cors_middleware`].
pub fn create_cors_middleware(
    policy: Arc<CorsPolicy>,
) -> impl Fn(Request, Next) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>
+ Clone {
    move |req, next| {
        let policy = policy.clone();
        Box::pin(async move { cors_middleware(req, next, policy).await })
    }
}

/// Generate a per-request UUID and expose it via tracing plus `X-Request-ID`.
pub async fn request_id_middleware(req: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let span = tracing::info_span!("request", request_id = %request_id);

    let mut response = next.run(req).instrument(span).await;

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(X_REQUEST_ID, header_value);
    }

    response
}
