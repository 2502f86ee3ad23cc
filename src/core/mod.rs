pub mod chat_stream;
pub mod config;
pub mod controller;
pub mod message;
pub mod parameters;
pub mod session;
pub mod store;
