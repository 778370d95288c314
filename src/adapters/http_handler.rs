use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    body::Body as AxumBody,
    extract::{ConnectInfo, Request, State},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
};
use tower_http::trace::TraceLayer;

use crate::{
    adapters::middleware::{
        CorsPolicy, create_cors_middleware, request_id_middleware, request_timing_middleware,
        security_headers_middleware,
    },
    core::{GatewayService, error::error_response, forwarder::ProxyRequest},
};

/// HTTP handler bridging axum requests into the gateway pipeline.
#[derive(Clone)]
pub struct HttpHandler {
    gateway_service: Arc<GatewayService>,
}

impl HttpHandler {
    pub fn new(gateway_service: Arc<GatewayService>) -> Self {
        Self { gateway_service }
    }

    /// Run a request through the pipeline. Failures become JSON error envelopes.
    pub async fn handle_request(
        &self,
        req: Request<AxumBody>,
        client_addr: Option<SocketAddr>,
    ) -> Response {
        let path = req.uri().path().to_string();
        let proxy_request = ProxyRequest::from_request(req);

        match self.gateway_service.handle(proxy_request, client_addr).await {
            Ok(response) => response.into_response(),
            Err(e) => error_response(&e, &path),
        }
    }
}

async fn proxy_handler(State(handler): State<HttpHandler>, req: Request) -> Response {
    // Absent when the router is driven without a socket, e.g. in tests.
    let client_addr = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    handler.handle_request(req, client_addr).await
}

/// Build the gateway router: every path and method goes to the pipeline,
/// wrapped in the CORS, security header, request id and tracing layers.
pub fn build_router(gateway_service: Arc<GatewayService>) -> Router {
    let config = gateway_service.config();
    let cors = Arc::new(CorsPolicy::from_config(&config.cors));
    let security_headers = config.security_headers;

    let router = Router::new()
        .route("/", any(proxy_handler))
        .route("/{*path}", any(proxy_handler))
        .with_state(HttpHandler::new(gateway_service))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_timing_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(middleware::from_fn(create_cors_middleware(cors)));

    if security_headers {
        router.layer(middleware::from_fn(security_headers_middleware))
    } else {
        router
    }
}
