pub mod logging;
pub mod tracing;
pub mod url;
