pub mod commands;
pub mod config;

pub use commands::AgentCommands;
pub use config::AgentConfig;
