//! Core gateway orchestration service.
//!
//! The `GatewayService` aggregates the immutable route table with the runtime
//! state shared by all requests (per-client rate limit buckets) and runs the
//! per-request pipeline:
//!
//! 1. route lookup
//! 2. rate limiting, when the matched rule asks for it
//! 3. bearer token validation, when the matched rule asks for it
//! 4. forwarding to the rule's backend
//!
//! Any stage may fail; a failure stops the pipeline and nothing reaches the
//! backend.
use std::{net::SocketAddr, sync::Arc};

use eyre::{Result, WrapErr};
use http::HeaderMap;

use crate::{
    config::ServerConfig,
    core::{
        error::GatewayError,
        forwarder::{ProxyForwarder, ProxyRequest, ProxyResponse},
        rate_limiter::RateLimiter,
        route_table::RouteTable,
        token_validator::TokenValidator,
    },
    ports::http_client::HttpClient,
};

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Central orchestrator. Share it behind an `Arc`; every field is either
/// immutable or internally synchronized.
pub struct GatewayService {
    config: Arc<ServerConfig>,
    routes: RouteTable,
    rate_limiter: Arc<RateLimiter>,
    validator: Arc<dyn TokenValidator>,
    forwarder: ProxyForwarder,
}

impl GatewayService {
    /// Compile routes and build the rate limiter from a validated configuration.
    pub fn new(
        config: Arc<ServerConfig>,
        http_client: Arc<dyn HttpClient>,
        validator: Arc<dyn TokenValidator>,
    ) -> Result<Self> {
        let routes = RouteTable::from_config(&config.routes, &config.services)
            .wrap_err("Failed to compile route table")?;
        let rate_limiter = RateLimiter::from_config(&config.rate_limit)
            .map_err(|e| eyre::eyre!("Failed to create rate limiter: {e}"))?;

        tracing::info!(routes = routes.len(), "Gateway service initialized");

        Ok(Self {
            config,
            routes,
            rate_limiter: Arc::new(rate_limiter),
            validator,
            forwarder: ProxyForwarder::new(http_client),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Shared handle used by the idle-bucket sweeper.
    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        self.rate_limiter.clone()
    }

    /// Run one request through the pipeline.
    pub async fn handle(
        &self,
        req: ProxyRequest,
        client_addr: Option<SocketAddr>,
    ) -> Result<ProxyResponse, GatewayError> {
        let rule = self
            .routes
            .find(&req.method, &req.path)
            .ok_or(GatewayError::RouteNotFound)?;

        tracing::debug!(
            method = %req.method,
            path = %req.path,
            pattern = rule.pattern.as_str(),
            target = %rule.target,
            "Route matched"
        );

        if rule.requires_rate_limit {
            let client = client_key(&req.headers, client_addr);
            if !self.rate_limiter.try_consume(&client) {
                return Err(GatewayError::RateLimitExceeded { client });
            }
        }

        let claims = if rule.requires_auth {
            let raw = req
                .headers
                .get(http::header::AUTHORIZATION)
                .ok_or(GatewayError::MissingOrMalformedToken)?
                .to_str()
                .map_err(|_| GatewayError::MissingOrMalformedToken)?;
            Some(self.validator.validate(raw)?)
        } else {
            None
        };

        self.forwarder
            .forward(req, &rule.target, claims.as_ref())
            .await
    }
}

/// Identity used for rate limiting: the first `X-Forwarded-For` entry, else
/// the socket IP, else `"unknown"`.
pub fn client_key(headers: &HeaderMap, client_addr: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, client_addr) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}
