//! Hearth is a terminal chat client for Ollama that keeps every conversation.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns sessions, the SQLite store, configuration, the streaming
//!   model client, and the chat controller that drives each turn.
//! - [`tools`] bridges model tool calls to built-in tools and MCP servers.
//! - [`mcp`] speaks the Model Context Protocol to servers over stdio.
//! - [`commands`] parses REPL slash commands into actions.
//! - [`api`] defines the Ollama wire payloads.
//!
//! The binary routes through [`crate::cli::main`], which dispatches to the
//! interactive REPL or to one-shot subcommands.

pub mod api;
pub mod cli;
pub mod commands;
pub mod core;
pub mod mcp;
pub mod tools;
pub mod utils;
