use std::{collections::HashSet, net::SocketAddr, time::Duration};

use eyre::Result;
use http::Method;
use jsonwebtoken::Algorithm;

use crate::{
    config::models::{CorsConfig, JwtConfig, RateLimitConfig, RouteRuleConfig, ServerConfig},
    core::route_table::RoutePattern,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Route conflict detected: {message}")]
    RouteConflict { message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Parse a humantime duration field, naming the field on failure.
pub fn parse_duration_field(field: &str, value: &str) -> ValidationResult<Duration> {
    humantime::parse_duration(value).map_err(|e| ValidationError::InvalidField {
        field: field.to_string(),
        message: format!("Invalid duration '{value}': {e}"),
    })
}

/// Server configuration validator
pub struct ServerConfigValidator;

impl ServerConfigValidator {
    /// Validate the entire server configuration, collecting every problem found.
    pub fn validate(config: &ServerConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if config.services.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "services".to_string(),
            });
        }
        for (name, url) in &config.services {
            if let Err(e) = Self::validate_url(url, &format!("services.{name}")) {
                errors.push(e);
            }
        }

        errors.extend(Self::validate_jwt(&config.jwt));
        errors.extend(Self::validate_rate_limit(&config.rate_limit));
        errors.extend(Self::validate_cors(&config.cors));

        if let Err(e) = parse_duration_field("backend_timeout", &config.backend_timeout) {
            errors.push(e);
        }

        if config.routes.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "routes".to_string(),
            });
        } else {
            for (index, rule) in config.routes.iter().enumerate() {
                if let Err(mut route_errors) = Self::validate_single_route(index, rule, config) {
                    errors.append(&mut route_errors);
                }
            }
        }

        if let Err(conflict_error_list) = Self::check_route_conflicts(&config.routes) {
            errors.extend(conflict_error_list);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_jwt(config: &JwtConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if config.secret.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "jwt.secret".to_string(),
            });
        }

        if config.algorithms.is_empty() {
            errors.push(ValidationError::InvalidField {
                field: "jwt.algorithms".to_string(),
                message: "At least one algorithm must be accepted".to_string(),
            });
        }

        for algorithm in &config.algorithms {
            if !matches!(
                algorithm,
                Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
            ) {
                errors.push(ValidationError::InvalidField {
                    field: "jwt.algorithms".to_string(),
                    message: format!("{algorithm:?} is not an HMAC algorithm"),
                });
            }
        }

        errors
    }

    /// Validate rate limit configuration
    fn validate_rate_limit(config: &RateLimitConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if config.capacity == 0 {
            errors.push(ValidationError::InvalidField {
                field: "rate_limit.capacity".to_string(),
                message: "Bucket capacity must be greater than 0".to_string(),
            });
        }

        if config.refill_tokens == 0 {
            errors.push(ValidationError::InvalidField {
                field: "rate_limit.refill_tokens".to_string(),
                message: "Refill amount must be greater than 0".to_string(),
            });
        }

        match parse_duration_field("rate_limit.refill_period", &config.refill_period) {
            Ok(period) if period.is_zero() => errors.push(ValidationError::InvalidField {
                field: "rate_limit.refill_period".to_string(),
                message: "Refill period must be greater than 0".to_string(),
            }),
            Ok(_) => {}
            Err(e) => errors.push(e),
        }

        match parse_duration_field("rate_limit.sweep_interval", &config.sweep_interval) {
            Ok(interval) if interval.is_zero() => errors.push(ValidationError::InvalidField {
                field: "rate_limit.sweep_interval".to_string(),
                message: "Sweep interval must be greater than 0".to_string(),
            }),
            Ok(_) => {}
            Err(e) => errors.push(e),
        }

        errors
    }

    fn validate_cors(config: &CorsConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for origin in &config.allowed_origins {
            if origin == "*" && config.allow_credentials {
                errors.push(ValidationError::InvalidField {
                    field: "cors.allowed_origins".to_string(),
                    message: "Wildcard origin cannot be combined with allow_credentials"
                        .to_string(),
                });
            } else if origin != "*" {
                if let Err(e) = Self::validate_url(origin, "cors.allowed_origins") {
                    errors.push(e);
                }
            }
        }

        for method in &config.allowed_methods {
            if Method::from_bytes(method.as_bytes()).is_err() {
                errors.push(ValidationError::InvalidField {
                    field: "cors.allowed_methods".to_string(),
                    message: format!("Invalid HTTP method '{method}'"),
                });
            }
        }

        errors
    }

    /// Validate a single route rule
    fn validate_single_route(
        index: usize,
        rule: &RouteRuleConfig,
        config: &ServerConfig,
    ) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let path = &rule.path;

        if !path.starts_with('/') {
            errors.push(ValidationError::InvalidField {
                field: format!("routes[{index}].path: {path}"),
                message: "Route paths must start with '/'".to_string(),
            });
        } else if let Err(message) = RoutePattern::parse(path) {
            errors.push(ValidationError::InvalidField {
                field: format!("routes[{index}].path: {path}"),
                message,
            });
        }

        for method in &rule.methods {
            if Method::from_bytes(method.as_bytes()).is_err() {
                errors.push(ValidationError::InvalidField {
                    field: format!("routes[{index}].methods"),
                    message: format!("Invalid HTTP method '{method}'"),
                });
            }
        }

        if !config.services.contains_key(&rule.service) {
            errors.push(ValidationError::InvalidField {
                field: format!("routes[{index}].service"),
                message: format!("Unknown service '{}'", rule.service),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate URL format
    fn validate_url(url_str: &str, context: &str) -> ValidationResult<()> {
        match url::Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: format!(
                            "URL scheme must be 'http' or 'https', got '{}'",
                            url.scheme()
                        ),
                    });
                }

                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: context.to_string(),
                        message: "URL must have a valid host".to_string(),
                    });
                }

                Ok(())
            }
            Err(e) => Err(ValidationError::InvalidField {
                field: context.to_string(),
                message: format!("Invalid URL format: {e}"),
            }),
        }
    }

    /// Rules are evaluated in order, so an exact repeat of an earlier
    /// path + method set can never match.
    fn check_route_conflicts(routes: &[RouteRuleConfig]) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut seen: HashSet<(String, Vec<String>)> = HashSet::new();

        for rule in routes {
            let mut methods: Vec<String> = rule.methods.iter().map(|m| m.to_uppercase()).collect();
            methods.sort();
            methods.dedup();

            if !seen.insert((rule.path.clone(), methods)) {
                errors.push(ValidationError::RouteConflict {
                    message: format!(
                        "Route '{}' {:?} is unreachable: an earlier rule has the same path and methods",
                        rule.path, rule.methods
                    ),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_valid_config() -> ServerConfig {
        ServerConfig::builder()
            .listen_addr("127.0.0.1:8080")
            .jwt_secret("unit-test-secret")
            .build()
            .unwrap()
    }

    #[test]
    fn validate_accepts_default_route_table() {
        assert!(ServerConfigValidator::validate(&minimal_valid_config()).is_ok());
    }

    #[test]
    fn validate_rejects_missing_secret() {
        let mut config = minimal_valid_config();
        config.jwt.secret = "   ".to_string();

        assert!(ServerConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn validate_rejects_asymmetric_algorithm() {
        let mut config = minimal_valid_config();
        config.jwt.algorithms = vec![Algorithm::RS256];

        assert!(ServerConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn validate_rejects_unknown_service() {
        let mut config = minimal_valid_config();
        config
            .routes
            .push(RouteRuleConfig::new("/api/orders/**", &["GET"], "orders"));

        let err = ServerConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("Unknown service 'orders'"));
    }

    #[test]
    fn validate_rejects_malformed_pattern() {
        let mut config = minimal_valid_config();
        config.routes = vec![RouteRuleConfig::new("/api/**/tail", &["GET"], "user")];

        assert!(ServerConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn validate_rejects_zero_capacity_and_bad_period() {
        let mut config = minimal_valid_config();
        config.rate_limit.capacity = 0;
        config.rate_limit.refill_period = "soon".to_string();

        let err = ServerConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("Found 2 validation errors"));
    }

    #[test]
    fn validate_rejects_non_http_service_url() {
        let mut config = minimal_valid_config();
        config
            .services
            .insert("media".to_string(), "ftp://media:21".to_string());

        assert!(ServerConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn validate_rejects_unreachable_duplicate_rule() {
        let mut config = minimal_valid_config();
        config.routes = vec![
            RouteRuleConfig::new("/api/products", &["GET"], "product"),
            RouteRuleConfig::new("/api/products", &["get"], "product").with_auth(),
        ];

        let err = ServerConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("unreachable"));
    }

    #[test]
    fn validate_rejects_wildcard_origin_with_credentials() {
        let mut config = minimal_valid_config();
        config.cors.allowed_origins = vec!["*".to_string()];

        assert!(ServerConfigValidator::validate(&config).is_err());
    }
}
