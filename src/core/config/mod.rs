pub mod data;
pub mod env;
pub mod io;

pub use data::{Config, McpServerConfig};
pub use env::EnvConfig;
pub use io::ConfigError;

#[cfg(test)]
mod tests;
