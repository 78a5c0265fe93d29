pub mod client;
pub mod config;
pub mod conversation;
pub mod marker;
pub mod tools;
pub mod types;

pub use types::{Tool, ToolSet};
