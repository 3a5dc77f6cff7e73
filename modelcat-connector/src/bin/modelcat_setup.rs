use clap::Parser;
use modelcat_connector::cli::{execute, Cli, Commands, SetupCli};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let SetupCli { args } = SetupCli::parse();
    execute(Cli {
        command: Commands::Setup(args),
    })
    .await
}
