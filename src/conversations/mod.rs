pub mod types;
pub mod confirmation;
pub mod single_conversation;
