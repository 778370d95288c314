//! Edge gateway: a reverse proxy in front of the user, product and media services.
//!
//! Every inbound request runs through a short pipeline:
//! route lookup, optional per-client rate limiting, optional bearer token
//! validation, then streaming forwarding to the matched backend. Failures at any
//! stage are turned into a uniform JSON error envelope.
//!
//! # Quick Example
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use edge_gateway::{
//!     GatewayService, HttpClientAdapter, JwtTokenValidator, adapters::build_router,
//!     config::loader::load_config,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let cfg = Arc::new(load_config("config.toml").await?);
//! let client = Arc::new(HttpClientAdapter::new(Duration::from_secs(60))?);
//! let validator = Arc::new(JwtTokenValidator::new(&cfg.jwt));
//! let gateway = Arc::new(GatewayService::new(cfg, client, validator)?);
//! let app = build_router(gateway);
//! # let _ = app;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! The crate separates **ports** (traits) from **adapters** (implementations) while keeping
//! the pipeline inside `core`. The backend HTTP client sits behind the
//! [`HttpClient`] port and token verification behind [`TokenValidator`], so both
//! can be replaced in tests.
//!
//! # Error Handling
//! Pipeline stages return domain errors built with `thiserror`; startup paths return
//! `eyre::Result<T>` with `WrapErr` context attached.
//!
//! # Concurrency & Data Structures
//! Routes are immutable after startup. Rate limit buckets are keyed `governor` cells updated
//! by compare-and-swap, so clients only contend with their own concurrent requests.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

// Re-export the specific types needed by the binary crate
pub use crate::{
    adapters::{BucketSweeper, HttpClientAdapter, HttpHandler},
    core::{GatewayService, JwtTokenValidator, TokenValidator},
    ports::http_client::HttpClient,
    utils::GracefulShutdown,
};
