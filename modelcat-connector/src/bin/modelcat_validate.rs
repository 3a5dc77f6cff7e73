use clap::Parser;
use modelcat_connector::cli::{execute, Cli, Commands, ValidateCli};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let ValidateCli { args } = ValidateCli::parse();
    execute(Cli {
        command: Commands::Validate(args),
    })
    .await
}
