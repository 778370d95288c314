//! Configuration data structures for the gateway.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. They are
//! serde‑friendly and include defaults so that a minimal config only needs the JWT secret.
//! The configuration is loaded once at startup and is immutable afterwards.
use std::{collections::HashMap, fmt};

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

pub const USER_SERVICE: &str = "user";
pub const PRODUCT_SERVICE: &str = "product";
pub const MEDIA_SERVICE: &str = "media";

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_services() -> HashMap<String, String> {
    HashMap::from([
        (USER_SERVICE.to_string(), "http://localhost:8081".to_string()),
        (PRODUCT_SERVICE.to_string(), "http://localhost:8082".to_string()),
        (MEDIA_SERVICE.to_string(), "http://localhost:8083".to_string()),
    ])
}

fn default_backend_timeout() -> String {
    "60s".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Backend base URLs keyed by service name (`user`, `product`, `media`).
    #[serde(default = "default_services")]
    pub services: HashMap<String, String>,
    #[serde(default)]
    pub jwt: JwtConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Time allowed for a backend to produce response headers. `"0s"` disables the limit.
    #[serde(default = "default_backend_timeout")]
    pub backend_timeout: String,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default = "default_true")]
    pub security_headers: bool,
    /// Ordered route rules; the first matching rule wins.
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteRuleConfig>,
}

impl ServerConfig {
    /// Create a new server configuration builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            services: default_services(),
            jwt: JwtConfig::default(),
            rate_limit: RateLimitConfig::default(),
            backend_timeout: default_backend_timeout(),
            cors: CorsConfig::default(),
            security_headers: true,
            routes: default_routes(),
        }
    }
}

/// Builder for ServerConfig, mostly useful for embedding and tests.
#[derive(Default)]
pub struct ServerConfigBuilder {
    listen_addr: Option<String>,
    services: HashMap<String, String>,
    jwt_secret: Option<String>,
    rate_limit: Option<RateLimitConfig>,
    backend_timeout: Option<String>,
    routes: Vec<RouteRuleConfig>,
}

impl ServerConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Point a named service at a backend base URL
    pub fn service(mut self, name: impl Into<String>, base_url: impl Into<String>) -> Self {
        self.services.insert(name.into(), base_url.into());
        self
    }

    /// Set the HMAC secret used to verify bearer tokens
    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.jwt_secret = Some(secret.into());
        self
    }

    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    pub fn backend_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.backend_timeout = Some(timeout.into());
        self
    }

    /// Append a route rule. When no rule is added the default table is used.
    pub fn route(mut self, rule: RouteRuleConfig) -> Self {
        self.routes.push(rule);
        self
    }

    /// Build the final ServerConfig
    pub fn build(self) -> Result<ServerConfig, String> {
        let secret = self
            .jwt_secret
            .ok_or_else(|| "jwt_secret is required".to_string())?;

        let mut services = default_services();
        services.extend(self.services);

        Ok(ServerConfig {
            listen_addr: self.listen_addr.unwrap_or_else(default_listen_addr),
            services,
            jwt: JwtConfig {
                secret,
                ..JwtConfig::default()
            },
            rate_limit: self.rate_limit.unwrap_or_default(),
            backend_timeout: self.backend_timeout.unwrap_or_else(default_backend_timeout),
            cors: CorsConfig::default(),
            security_headers: true,
            routes: if self.routes.is_empty() {
                default_routes()
            } else {
                self.routes
            },
        })
    }
}

fn default_algorithms() -> Vec<Algorithm> {
    vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512]
}

/// Token verification settings. The secret is redacted from `Debug` output.
#[derive(Serialize, Deserialize, Clone)]
pub struct JwtConfig {
    #[serde(default)]
    pub secret: String,
    /// Accepted HMAC algorithms.
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<Algorithm>,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            algorithms: default_algorithms(),
        }
    }
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("algorithms", &self.algorithms)
            .finish()
    }
}

/// Token bucket settings shared by every client of rate-limited routes.
///
/// A bucket holds at most `capacity` tokens and regains `refill_tokens` every
/// `refill_period` (continuously, not in steps).
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    pub capacity: u32,
    pub refill_tokens: u32,
    /// Parsed by humantime, e.g. "1s", "1m".
    pub refill_period: String,
    /// How often buckets that have refilled completely are dropped.
    pub sweep_interval: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_tokens: 10,
            refill_period: "1m".to_string(),
            sweep_interval: "60s".to_string(),
        }
    }
}

/// Static CORS policy applied in front of the pipeline.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:4200".to_string(),
                "http://localhost:3000".to_string(),
            ],
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
                .into_iter()
                .map(String::from)
                .collect(),
            exposed_headers: vec!["Authorization".to_string()],
            allow_credentials: true,
            max_age_secs: 3600,
        }
    }
}

/// One entry of the ordered route table.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RouteRuleConfig {
    /// Exact path, `{var}` segments, or a trailing `/**` wildcard.
    pub path: String,
    /// Allowed methods; empty means any method.
    #[serde(default)]
    pub methods: Vec<String>,
    /// Key into `ServerConfig::services`.
    pub service: String,
    #[serde(default)]
    pub auth: bool,
    #[serde(default)]
    pub rate_limit: bool,
}

impl RouteRuleConfig {
    pub fn new(path: impl Into<String>, methods: &[&str], service: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            service: service.into(),
            auth: false,
            rate_limit: false,
        }
    }

    pub fn with_auth(mut self) -> Self {
        self.auth = true;
        self
    }

    pub fn with_rate_limit(mut self) -> Self {
        self.rate_limit = true;
        self
    }
}

/// The gateway's standard route table for the user, product and media services.
pub fn default_routes() -> Vec<RouteRuleConfig> {
    vec![
        RouteRuleConfig::new("/api/users/register", &["POST"], USER_SERVICE),
        RouteRuleConfig::new("/api/users/login", &["POST"], USER_SERVICE).with_rate_limit(),
        RouteRuleConfig::new("/api/users/avatars/{filename}", &["GET"], USER_SERVICE),
        RouteRuleConfig::new("/api/users/profile/**", &["GET", "PUT"], USER_SERVICE).with_auth(),
        RouteRuleConfig::new("/api/products/my-products", &["GET"], PRODUCT_SERVICE).with_auth(),
        RouteRuleConfig::new("/api/products", &["GET"], PRODUCT_SERVICE),
        RouteRuleConfig::new("/api/products/{id}", &["GET"], PRODUCT_SERVICE),
        RouteRuleConfig::new("/api/products/**", &["POST", "PUT", "DELETE"], PRODUCT_SERVICE)
            .with_auth(),
        RouteRuleConfig::new("/api/media/{id}", &["GET"], MEDIA_SERVICE),
        RouteRuleConfig::new("/api/media/product/{productId}", &["GET"], MEDIA_SERVICE),
        RouteRuleConfig::new("/api/media/**", &["POST", "DELETE"], MEDIA_SERVICE).with_auth(),
    ]
}
