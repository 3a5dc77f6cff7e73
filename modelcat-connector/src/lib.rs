pub mod api;
pub mod cli;
pub mod load_config;
pub mod logging;
pub mod prompt;

pub use cli::{execute, run, Cli, Commands};
