//! The strategy chain.

use crate::types::{McpError, McpResult};

use super::principal::Principal;

/// One way of turning a credential header into a principal.
///
/// `Ok(None)` means the header is not in a shape this strategy understands
/// and the next strategy should be tried. `Err` means it is, but the
/// credential is malformed or invalid.
pub trait AuthorizationStrategy: Send + Sync {
    fn attempt(&self, header: &str) -> McpResult<Option<Principal>>;
}

impl<F> AuthorizationStrategy for F
where
    F: Fn(&str) -> McpResult<Option<Principal>> + Send + Sync,
{
    fn attempt(&self, header: &str) -> McpResult<Option<Principal>> {
        self(header)
    }
}

#[derive(Default)]
pub struct AuthorizationManager {
    strategies: Vec<Box<dyn AuthorizationStrategy>>,
}

impl AuthorizationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: impl AuthorizationStrategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// The first strategy that yields a principal wins; a rejection stops the chain.
    pub fn authorize(&self, header: &str) -> McpResult<Principal> {
        for strategy in &self.strategies {
            if let Some(principal) = strategy.attempt(header)? {
                tracing::debug!("Authorized principal {}", principal.id);
                return Ok(principal);
            }
        }
        Err(McpError::Authorization(
            "No valid authorization strategy".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decline(_: &str) -> McpResult<Option<Principal>> {
        Ok(None)
    }

    fn accept(_: &str) -> McpResult<Option<Principal>> {
        Ok(Some(Principal::new("s2", ["read"])))
    }

    fn reject(_: &str) -> McpResult<Option<Principal>> {
        Err(McpError::Authorization("bad".to_string()))
    }

    #[test]
    fn test_first_accepting_strategy_wins() {
        let manager = AuthorizationManager::new()
            .with_strategy(decline)
            .with_strategy(accept);
        assert_eq!(manager.authorize("anything").unwrap().id, "s2");
    }

    #[test]
    fn test_all_declining_fails() {
        let manager = AuthorizationManager::new().with_strategy(decline);
        assert!(matches!(
            manager.authorize("anything"),
            Err(McpError::Authorization(_))
        ));
    }

    #[test]
    fn test_empty_chain_fails() {
        assert!(AuthorizationManager::new().authorize("x").is_err());
    }

    #[test]
    fn test_rejection_stops_chain() {
        let manager = AuthorizationManager::new()
            .with_strategy(reject)
            .with_strategy(accept);
        assert!(manager.authorize("x").is_err());
    }
}
