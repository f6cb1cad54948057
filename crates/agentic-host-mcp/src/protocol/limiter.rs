//! Fixed-window request limits keyed by tool name or completion reference.

use std::num::{NonZeroU32, NonZeroU64};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::types::{McpError, McpResult};

#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    count: u32,
}

/// Admits at most `limit` calls per key in each window. A window opens on
/// the first call for a key and closes `window` later.
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: DashMap<String, Window>,
}

impl RateLimiter {
    pub fn new(limit: NonZeroU32, window: Duration) -> Self {
        Self {
            limit: limit.get(),
            window,
            windows: DashMap::new(),
        }
    }

    pub fn check(&self, key: &str) -> McpResult<()> {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> McpResult<()> {
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert(Window { start: now, count: 0 });

        if now.saturating_duration_since(entry.start) >= self.window {
            *entry = Window { start: now, count: 0 };
        }
        if entry.count >= self.limit {
            tracing::debug!("Rate limit hit for {key}");
            return Err(McpError::RateLimited(key.to_string()));
        }
        entry.count += 1;
        Ok(())
    }
}

/// Per-window budgets. A missing budget means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitConfig {
    pub tools_per_window: Option<NonZeroU32>,
    pub completions_per_window: Option<NonZeroU32>,
    pub window_ms: NonZeroU64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            tools_per_window: None,
            completions_per_window: None,
            window_ms: NonZeroU64::MIN.saturating_add(999),
        }
    }
}

impl RateLimitConfig {
    /// Build the limiters. Handlers given clones of the same `RateLimits`
    /// share one budget.
    pub fn limits(&self) -> RateLimits {
        let window = Duration::from_millis(self.window_ms.get());
        let build =
            |limit: Option<NonZeroU32>| limit.map(|l| Arc::new(RateLimiter::new(l, window)));
        RateLimits {
            tools: build(self.tools_per_window),
            completions: build(self.completions_per_window),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RateLimits {
    /// Keyed by tool name.
    pub tools: Option<Arc<RateLimiter>>,
    /// Keyed by completion reference.
    pub completions: Option<Arc<RateLimiter>>,
}

impl RateLimits {
    pub fn check_tool(&self, name: &str) -> McpResult<()> {
        self.tools.as_ref().map_or(Ok(()), |l| l.check(name))
    }

    pub fn check_completion(&self, reference: &str) -> McpResult<()> {
        self.completions
            .as_ref()
            .map_or(Ok(()), |l| l.check(reference))
    }
}
