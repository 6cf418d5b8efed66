pub mod agent_interface;
pub mod tool_calling_agent;

pub use agent_interface::*;
pub use tool_calling_agent::*;
