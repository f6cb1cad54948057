//! Non-interactive elicitation provider.

use async_trait::async_trait;

use crate::provider::ElicitationProvider;
use crate::types::{ElicitAction, ElicitRequest, ElicitResult, HostResult};

/// Answers every elicitation with the same result. Used by headless hosts,
/// which decline by default.
#[derive(Debug, Clone)]
pub struct StaticElicitationProvider {
    result: ElicitResult,
}

impl StaticElicitationProvider {
    pub fn new(result: ElicitResult) -> Self {
        Self { result }
    }

    pub fn declining() -> Self {
        Self::new(ElicitResult {
            action: ElicitAction::Decline,
            content: None,
        })
    }
}

#[async_trait]
impl ElicitationProvider for StaticElicitationProvider {
    async fn elicit(&self, request: ElicitRequest, _timeout_ms: u64) -> HostResult<ElicitResult> {
        tracing::debug!(
            "Answering elicitation '{}' with {:?}",
            request.message,
            self.result.action
        );
        Ok(self.result.clone())
    }
}
