//! Model Context Protocol client used to discover and call remote business tools.

pub mod client;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use registry::McpToolRegistryProvider;
