//! `Authorization: Bearer <token>` support.

use std::collections::HashMap;

use crate::types::{McpError, McpResult};

use super::manager::AuthorizationStrategy;
use super::principal::Principal;

const SCHEME: &str = "bearer";

/// Looks a bearer token up and yields the principal it belongs to.
pub trait TokenResolver: Send + Sync {
    fn resolve(&self, token: &str) -> McpResult<Principal>;
}

impl<F> TokenResolver for F
where
    F: Fn(&str) -> McpResult<Principal> + Send + Sync,
{
    fn resolve(&self, token: &str) -> McpResult<Principal> {
        self(token)
    }
}

/// Fixed token table, usually loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenResolver {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenResolver for StaticTokenResolver {
    fn resolve(&self, token: &str) -> McpResult<Principal> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| McpError::Authorization("Invalid bearer token".to_string()))
    }
}

pub struct BearerTokenStrategy {
    resolver: Box<dyn TokenResolver>,
}

impl BearerTokenStrategy {
    pub fn new(resolver: impl TokenResolver + 'static) -> Self {
        Self {
            resolver: Box::new(resolver),
        }
    }
}

impl AuthorizationStrategy for BearerTokenStrategy {
    fn attempt(&self, header: &str) -> McpResult<Option<Principal>> {
        let header = header.trim();
        let Some(scheme) = header.get(..SCHEME.len()) else {
            return Ok(None);
        };
        if !scheme.eq_ignore_ascii_case(SCHEME) {
            return Ok(None);
        }

        let rest = &header[SCHEME.len()..];
        if rest.is_empty() {
            return Err(McpError::Authorization("Empty bearer token".to_string()));
        }
        if !rest.starts_with(' ') {
            // Some other scheme that happens to start with "bearer".
            return Ok(None);
        }

        let token = rest.trim();
        if token.is_empty() {
            return Err(McpError::Authorization("Empty bearer token".to_string()));
        }

        self.resolver.resolve(token).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy() -> BearerTokenStrategy {
        BearerTokenStrategy::new(
            StaticTokenResolver::new().with_token("secret", Principal::new("alice", ["tools"])),
        )
    }

    #[test]
    fn test_valid_token() {
        let principal = strategy().attempt("Bearer secret").unwrap().unwrap();
        assert_eq!(principal.id, "alice");
        assert!(principal.has_scope("tools"));
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        assert!(strategy().attempt("bearer secret").unwrap().is_some());
    }

    #[test]
    fn test_other_schemes_declined() {
        assert!(strategy().attempt("Basic dXNlcjpwdw==").unwrap().is_none());
        assert!(strategy().attempt("").unwrap().is_none());
        assert!(strategy().attempt("Bearerish x").unwrap().is_none());
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(strategy().attempt("Bearer").is_err());
        assert!(strategy().attempt("Bearer ").is_err());
        assert!(strategy().attempt("Bearer    ").is_err());
    }

    #[test]
    fn test_unknown_token_rejected() {
        assert!(matches!(
            strategy().attempt("Bearer nope"),
            Err(McpError::Authorization(_))
        ));
    }

    #[test]
    fn test_closure_resolver() {
        let strategy = BearerTokenStrategy::new(|token: &str| -> McpResult<Principal> {
            Ok(Principal::new(token, ["all"]))
        });
        assert_eq!(strategy.attempt("Bearer bob").unwrap().unwrap().id, "bob");
    }
}
