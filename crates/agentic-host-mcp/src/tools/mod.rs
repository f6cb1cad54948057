//! Built-in tools served by the `serve` command.

pub mod countdown;
pub mod echo;
pub mod registry;

pub use registry::BuiltinToolProvider;
