//! Per-session protocol handlers for the HTTP transport.

pub mod registry;

pub use registry::{HandlerFactory, SessionRegistry};
