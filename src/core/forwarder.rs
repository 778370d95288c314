//! Outbound request construction and response relay.
use std::sync::Arc;

use axum::{
    body::{Body as AxumBody, HttpBody},
    response::{IntoResponse, Response},
};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode, header};

use crate::{
    core::{backend::BackendUrl, error::GatewayError, token_validator::Claims},
    ports::http_client::HttpClient,
};

pub const X_USER_ID: HeaderName = HeaderName::from_static("x-user-id");
pub const X_USER_ROLE: HeaderName = HeaderName::from_static("x-user-role");

/// Request headers never copied to the backend.
const STRIPPED_REQUEST_HEADERS: [HeaderName; 4] =
    [header::HOST, header::CONTENT_LENGTH, X_USER_ID, X_USER_ROLE];

/// An inbound request, decoupled from the server framework.
#[derive(Debug)]
pub struct ProxyRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: AxumBody,
}

impl ProxyRequest {
    pub fn from_request(req: Request<AxumBody>) -> Self {
        let (parts, body) = req.into_parts();
        Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            body,
        }
    }
}

#[derive(Debug)]
pub enum ResponseBody {
    /// `image/*` payloads, relayed byte for byte.
    Binary(AxumBody),
    Text(AxumBody),
    Empty,
}

#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub content_type: Option<String>,
    pub body: ResponseBody,
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let body = match self.body {
            ResponseBody::Binary(body) | ResponseBody::Text(body) => body,
            ResponseBody::Empty => AxumBody::empty(),
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Copy request headers for the backend, dropping hop-specific and
/// identity headers.
pub fn outbound_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(inbound.len());
    for (name, value) in inbound {
        if !STRIPPED_REQUEST_HEADERS.contains(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

#[derive(Clone)]
pub struct ProxyForwarder {
    http_client: Arc<dyn HttpClient>,
}

impl ProxyForwarder {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }

    pub async fn forward(
        &self,
        req: ProxyRequest,
        target: &BackendUrl,
        claims: Option<&Claims>,
    ) -> Result<ProxyResponse, GatewayError> {
        let url = target.join(&req.path, req.query.as_deref());

        let mut headers = outbound_headers(&req.headers);
        if let Some(claims) = claims {
            headers.insert(X_USER_ID, header_value(&claims.user_id, "userId")?);
            headers.insert(X_USER_ROLE, header_value(&claims.role, "role")?);
        }

        let mut outbound = Request::builder()
            .method(req.method)
            .uri(&url)
            .body(req.body)
            .map_err(|e| GatewayError::Internal(format!("Failed to build request to {url}: {e}")))?;
        *outbound.headers_mut() = headers;

        tracing::debug!(%url, "Forwarding request");

        let response = self.http_client.send_request(outbound).await?;
        let (mut parts, body) = response.into_parts();
        parts.headers.remove(header::TRANSFER_ENCODING);

        let content_type = parts
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let is_image = content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("image/"));

        let body = if is_image {
            ResponseBody::Binary(body)
        } else if is_empty_body(&body, &parts.headers) {
            ResponseBody::Empty
        } else {
            ResponseBody::Text(body)
        };

        Ok(ProxyResponse {
            status: parts.status,
            headers: parts.headers,
            content_type,
            body,
        })
    }
}

fn header_value(value: &str, claim: &str) -> Result<HeaderValue, GatewayError> {
    HeaderValue::from_str(value).map_err(|_| {
        GatewayError::Internal(format!("Claim '{claim}' is not a valid header value"))
    })
}

fn is_empty_body(body: &AxumBody, headers: &HeaderMap) -> bool {
    body.is_end_stream()
        || body.size_hint().exact() == Some(0)
        || headers
            .get(header::CONTENT_LENGTH)
            .is_some_and(|v| v.as_bytes() == b"0")
}
