use clap::Parser;
use modelcat_connector::cli::{execute, Cli};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    execute(Cli::parse()).await
}
