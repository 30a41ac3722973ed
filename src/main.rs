mod auth;
mod cli;
mod config;
mod error;
mod gitlab;
mod graph;
mod output;
mod report;
mod runner;

use std::process::ExitCode;

use clap::Parser;
use cli::Cli;
use log::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting gitlab2graph");
    match cli.execute().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
