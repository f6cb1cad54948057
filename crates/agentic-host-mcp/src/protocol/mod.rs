//! MCP protocol handling: JSON-RPC codec, lifecycle, dispatch.

pub mod codec;
pub mod handler;
pub mod lifecycle;
pub mod limiter;
pub mod method;
pub mod progress;
pub mod server;
pub mod tracker;
pub mod validator;

pub use handler::{ProtocolHandler, Providers};
pub use lifecycle::{negotiate_version, LifecycleState, ServerLifecycle};
pub use limiter::{RateLimitConfig, RateLimiter, RateLimits};
pub use method::{check_server_capability, RequestMethod};
pub use progress::{ProgressRecord, ProgressTracker};
pub use server::serve_connection;
pub use tracker::IdentifierTracker;
