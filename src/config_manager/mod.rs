pub mod main;
pub mod system;
pub mod agent;
pub mod stateless_llm;
pub mod utils;

pub use main::Config;
