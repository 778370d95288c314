//! Ordered, immutable route table.
//!
//! Rules are compiled once from configuration and never mutated, so lookups
//! need no synchronization. The first rule (in declaration order) whose
//! method set and path pattern both accept the request wins.
use std::collections::HashMap;

use http::Method;

use crate::{
    config::models::RouteRuleConfig,
    core::backend::{BackendError, BackendUrl},
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

/// A compiled path pattern: exact literals, `{name}` segments and an
/// optional trailing `/**` wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
    wildcard_tail: bool,
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> Result<Self, String> {
        let body = pattern
            .strip_prefix('/')
            .ok_or_else(|| format!("Pattern '{pattern}' must start with '/'"))?;

        let (body, wildcard_tail) = match body.strip_suffix("/**") {
            Some(prefix) => (prefix, true),
            None if body == "**" => ("", true),
            None => (body, false),
        };

        let mut segments = Vec::new();
        if !(wildcard_tail && body.is_empty()) {
            for part in body.split('/') {
                segments.push(Self::parse_segment(pattern, part)?);
            }
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
            wildcard_tail,
        })
    }

    fn parse_segment(pattern: &str, part: &str) -> Result<Segment, String> {
        if part.contains("**") {
            return Err(format!(
                "Pattern '{pattern}': '**' is only allowed as the final segment"
            ));
        }

        match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            Some(name) if name.is_empty() => {
                Err(format!("Pattern '{pattern}': empty variable name"))
            }
            Some(name) if name.contains(['{', '}']) => {
                Err(format!("Pattern '{pattern}': nested braces in '{part}'"))
            }
            Some(name) => Ok(Segment::Variable(name.to_string())),
            None if part.contains(['{', '}']) => Err(format!(
                "Pattern '{pattern}': variables must span a whole segment, got '{part}'"
            )),
            None => Ok(Segment::Literal(part.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Walk `path` against the pattern, reporting each `{name}` binding to
    /// `bind`. Allocates nothing.
    fn walk<'p>(&self, path: &'p str, mut bind: impl FnMut(&str, &'p str)) -> bool {
        let Some(body) = path.strip_prefix('/') else {
            return false;
        };

        // Only `/**` accepts the bare root.
        if self.wildcard_tail && body.is_empty() {
            return self.segments.is_empty();
        }

        let mut parts = body.split('/');
        for segment in &self.segments {
            let Some(part) = parts.next() else {
                return false;
            };
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Variable(name) if !part.is_empty() => bind(name.as_str(), part),
                _ => return false,
            }
        }

        self.wildcard_tail || parts.next().is_none()
    }

    pub fn matches(&self, path: &str) -> bool {
        self.walk(path, |_, _| {})
    }
}

/// A single compiled route: where to send it and which checks to run first.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub pattern: RoutePattern,
    /// Empty means any method.
    pub methods: Vec<Method>,
    pub target: BackendUrl,
    pub requires_auth: bool,
    pub requires_rate_limit: bool,
}

impl RouteRule {
    pub fn accepts(&self, method: &Method, path: &str) -> bool {
        (self.methods.is_empty() || self.methods.contains(method)) && self.pattern.matches(path)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RouteTableError {
    #[error("Invalid route pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid method '{method}' in route '{path}'")]
    InvalidMethod { path: String, method: String },

    #[error("Route '{path}' references unknown service '{service}'")]
    UnknownService { path: String, service: String },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>) -> Self {
        Self { rules }
    }

    /// Compile configured rules, resolving each service name to its base URL.
    pub fn from_config(
        rules: &[RouteRuleConfig],
        services: &HashMap<String, String>,
    ) -> Result<Self, RouteTableError> {
        let mut compiled = Vec::with_capacity(rules.len());

        for rule in rules {
            let pattern = RoutePattern::parse(&rule.path).map_err(RouteTableError::InvalidPattern)?;

            let methods = rule
                .methods
                .iter()
                .map(|m| {
                    Method::from_bytes(m.to_uppercase().as_bytes()).map_err(|_| {
                        RouteTableError::InvalidMethod {
                            path: rule.path.clone(),
                            method: m.clone(),
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let base_url =
                services
                    .get(&rule.service)
                    .ok_or_else(|| RouteTableError::UnknownService {
                        path: rule.path.clone(),
                        service: rule.service.clone(),
                    })?;

            compiled.push(RouteRule {
                pattern,
                methods,
                target: BackendUrl::new(base_url)?,
                requires_auth: rule.auth,
                requires_rate_limit: rule.rate_limit,
            });
        }

        Ok(Self::new(compiled))
    }

    /// First rule in declaration order accepting `method` and `path`.
    pub fn find(&self, method: &Method, path: &str) -> Option<&RouteRule> {
        self.rules.iter().find(|rule| rule.accepts(method, path))
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
