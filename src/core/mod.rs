pub mod backend;
pub mod error;
pub mod forwarder;
pub mod gateway;
pub mod rate_limiter;
pub mod route_table;
pub mod token_validator;

pub use error::{ErrorEnvelope, GatewayError};
pub use forwarder::{ProxyForwarder, ProxyRequest, ProxyResponse, ResponseBody};
pub use gateway::GatewayService;
pub use rate_limiter::RateLimiter;
pub use route_table::{RoutePattern, RouteRule, RouteTable};
pub use token_validator::{AuthError, Claims, JwtTokenValidator, TokenValidator};
