//! Command-line interface parsing and dispatch.
//!
//! With no subcommand, `hearth` opens the interactive chat on the most
//! recent session.

pub mod models;
pub mod repl;
pub mod runtime;
pub mod say;
pub mod sessions;
pub mod settings;
pub mod tools_list;

#[cfg(test)]
mod tests;

use std::error::Error;
use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::cli::runtime::Runtime;
use crate::cli::settings::{describe, set_in_file, unset_in_file};
use crate::core::config::{Config, EnvConfig};
use crate::utils::tracing::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "hearth", version)]
#[command(about = "A persistent terminal chat client for Ollama")]
#[command(
    long_about = "Hearth keeps every conversation with your local Ollama models in a SQLite \
database so you can pick up where you left off. Models can call built-in tools and \
tools from MCP servers.\n\n\
Environment Variables:\n\
  OLLAMA_URL          Base URL of the Ollama server\n\
  OLLAMA_HOST         host:port used when OLLAMA_URL is unset (default 127.0.0.1:11434)\n\
  HEARTH_DATA_DIR     Where the session database lives\n\
  HEARTH_VERIFY_SSL   Set to false to accept invalid certificates\n\
  HEARTH_LOG          Diagnostics filter, e.g. hearth=debug\n\n\
Type /help inside the chat for slash commands."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub chat: ChatArgs,
}

#[derive(ClapArgs, Debug, Clone, Default, PartialEq)]
pub struct ChatArgs {
    /// Resume a session by id or id prefix
    #[arg(short, long, conflicts_with = "new")]
    pub session: Option<String>,

    /// Start a fresh session instead of resuming the latest one
    #[arg(short, long)]
    pub new: bool,

    /// Name for the session
    #[arg(long)]
    pub name: Option<String>,

    /// Model to chat with
    #[arg(short, long)]
    pub model: Option<String>,

    /// System prompt for the session
    #[arg(long)]
    pub system: Option<String>,

    /// Append the conversation to this file
    #[arg(short, long)]
    pub log: Option<String>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Start the interactive chat (default)
    Chat(ChatArgs),
    /// Send one prompt and print the reply
    Say {
        /// Model to use
        #[arg(short, long)]
        model: Option<String>,
        /// Continue this session instead of starting a new one
        #[arg(short, long)]
        session: Option<String>,
        /// The prompt text
        #[arg(trailing_var_arg = true, required = true)]
        prompt: Vec<String>,
    },
    /// List saved sessions
    Sessions,
    /// Delete a saved session
    Delete {
        /// Session id or id prefix
        id: String,
    },
    /// Write a session transcript to a text file
    Export {
        /// Session id or id prefix
        id: String,
        /// Output path (defaults to hearth-<id>-<date>.txt)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List models installed on the server
    Models,
    /// Show details for a model
    Show { model: String },
    /// Download a model to the server
    Pull { model: String },
    /// List available tools and MCP prompts
    Tools,
    /// Show the current configuration
    Config,
    /// Set a configuration value
    Set {
        /// Configuration key to set
        key: String,
        /// Value to set for the key
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset a configuration value
    Unset {
        /// Configuration key to unset
        key: String,
        /// Optional qualifier, such as an MCP server id
        value: Option<String>,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let env = EnvConfig::from_env();

    if let Err(err) = init_tracing(&env.diagnostics_log_path()) {
        eprintln!("⚠️  Diagnostics log unavailable: {err}");
    }

    match args.command.unwrap_or(Commands::Chat(args.chat)) {
        Commands::Config => {
            let config = Config::load()?;
            println!("{}", describe(&config));
            Ok(())
        }
        Commands::Set { key, value } => {
            let path = Config::config_path()?;
            match set_in_file(&path, &key, &value) {
                Ok(message) => println!("{message}"),
                Err(err) => {
                    err.print();
                    std::process::exit(1);
                }
            }
            Ok(())
        }
        Commands::Unset { key, value } => {
            let path = Config::config_path()?;
            match unset_in_file(&path, &key, value.as_deref()) {
                Ok(message) => println!("{message}"),
                Err(err) => {
                    err.print();
                    std::process::exit(1);
                }
            }
            Ok(())
        }
        command => {
            let runtime = Runtime::open(env).await?;
            match command {
                Commands::Chat(chat) => repl::run_chat(runtime, chat).await,
                Commands::Say {
                    model,
                    session,
                    prompt,
                } => say::run_say(&runtime, prompt, model, session).await,
                Commands::Sessions => sessions::list_sessions(&runtime).await,
                Commands::Delete { id } => sessions::delete_session(&runtime, &id).await,
                Commands::Export { id, output } => {
                    sessions::export_session(&runtime, &id, output).await
                }
                Commands::Models => models::list_models(&runtime).await,
                Commands::Show { model } => models::show_model(&runtime, &model).await,
                Commands::Pull { model } => models::pull_model(&runtime, &model).await,
                Commands::Tools => tools_list::list_tools(&runtime).await,
                Commands::Config | Commands::Set { .. } | Commands::Unset { .. } => Ok(()),
            }
        }
    }
}
