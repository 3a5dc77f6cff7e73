use clap::Parser;
use modelcat_connector::cli::{execute, Cli, Commands, UploadCli};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let UploadCli { args } = UploadCli::parse();
    execute(Cli {
        command: Commands::Upload(args),
    })
    .await
}
