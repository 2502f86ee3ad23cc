//! Model Context Protocol integration over stdio.

pub mod client;
pub mod manager;
pub mod prompt_args;
pub mod protocol;

pub use manager::{McpManager, McpServer};
