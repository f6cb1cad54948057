//! Progress history and cancellation flags keyed by progress token.
//!
//! The tracker only records state. Work that wants to be cancellable polls
//! [`ProgressTracker::cancelled`] at safe points and stops on its own.

use dashmap::DashMap;
use serde_json::Value;

use crate::types::{McpError, McpResult, ProgressToken};

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRecord {
    pub progress: f64,
    pub total: Option<f64>,
    pub message: Option<String>,
}

#[derive(Debug, Default)]
struct TokenState {
    records: Vec<ProgressRecord>,
    active: bool,
    cancelled: Option<String>,
}

#[derive(Debug, Default)]
pub struct ProgressTracker {
    tokens: DashMap<ProgressToken, TokenState>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin an empty history for `token`. Restarting a token resets it.
    pub fn start(&self, token: &ProgressToken) {
        self.tokens.insert(
            token.clone(),
            TokenState {
                active: true,
                ..TokenState::default()
            },
        );
    }

    /// Append a record. Tokens that were never started still keep their updates.
    pub fn notify(
        &self,
        token: &ProgressToken,
        progress: f64,
        total: Option<f64>,
        message: Option<String>,
    ) {
        self.tokens
            .entry(token.clone())
            .or_default()
            .records
            .push(ProgressRecord {
                progress,
                total,
                message,
            });
    }

    /// Mark `token` cancelled. The first reason is kept; history is untouched.
    pub fn cancel(&self, token: &ProgressToken, reason: Option<&str>) {
        let mut state = self.tokens.entry(token.clone()).or_default();
        if state.cancelled.is_none() {
            tracing::debug!("Progress token {token} cancelled");
            state.cancelled = Some(reason.unwrap_or_default().to_string());
        }
    }

    pub fn cancelled(&self, token: &ProgressToken) -> bool {
        self.tokens
            .get(token)
            .is_some_and(|s| s.cancelled.is_some())
    }

    pub fn cancel_reason(&self, token: &ProgressToken) -> Option<String> {
        self.tokens.get(token).and_then(|s| s.cancelled.clone())
    }

    /// Mark `token` inactive. Its history stays until [`ProgressTracker::clear`].
    pub fn release(&self, token: &ProgressToken) {
        if let Some(mut state) = self.tokens.get_mut(token) {
            state.active = false;
        }
    }

    pub fn clear(&self, token: &ProgressToken) {
        self.tokens.remove(token);
    }

    pub fn active(&self, token: &ProgressToken) -> bool {
        self.tokens.get(token).is_some_and(|s| s.active)
    }

    /// Snapshot of the history for `token`, oldest first.
    pub fn progress(&self, token: &ProgressToken) -> Vec<ProgressRecord> {
        self.tokens
            .get(token)
            .map(|s| s.records.clone())
            .unwrap_or_default()
    }
}

/// Read `_meta.progressToken` from request params.
pub fn progress_token(params: Option<&Value>) -> McpResult<Option<ProgressToken>> {
    let Some(token) = params
        .and_then(|p| p.get("_meta"))
        .and_then(|m| m.get("progressToken"))
    else {
        return Ok(None);
    };

    match token {
        Value::String(s) => Ok(Some(ProgressToken::String(s.clone()))),
        Value::Number(n) => n
            .as_i64()
            .map(|n| Some(ProgressToken::Number(n)))
            .ok_or_else(|| McpError::InvalidParams("progressToken must be an integer".to_string())),
        _ => Err(McpError::InvalidParams(
            "progressToken must be a string or integer".to_string(),
        )),
    }
}
