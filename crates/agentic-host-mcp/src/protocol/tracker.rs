//! Per-connection registry of in-flight request ids.

use dashmap::DashSet;

use crate::types::{McpError, McpResult, RequestId};

/// Ids must be unique among requests still outstanding on one connection.
/// Reusing an id after its response has been sent is allowed.
#[derive(Debug, Default)]
pub struct IdentifierTracker {
    outstanding: DashSet<RequestId>,
}

impl IdentifierTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: &RequestId) -> McpResult<()> {
        if self.outstanding.insert(id.clone()) {
            Ok(())
        } else {
            Err(McpError::DuplicateIdentifier(id.clone()))
        }
    }

    /// Releasing an id that is not outstanding does nothing.
    pub fn release(&self, id: &RequestId) {
        self.outstanding.remove(id);
    }

    pub fn is_outstanding(&self, id: &RequestId) -> bool {
        self.outstanding.contains(id)
    }

    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }
}
