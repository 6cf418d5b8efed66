pub mod input_types;
pub mod agent_factory;
pub mod stateless_llm_factory;
pub mod prompts;
pub mod tool_policy;

pub mod agents;
pub mod stateless_llm;
